//! Conversation Memory
//!
//! Keeps the most recent messages of each conversation in a fixed-capacity
//! window. The oldest message is evicted once the window is full.

use agentrag_common::config::MemoryConfig;
use agentrag_common::metrics;
use agentrag_retrieval::Metadata;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// Messages scanned for topics
const TOPIC_SCAN_MESSAGES: usize = 5;

/// Topics reported per summary
const MAX_TOPICS: usize = 5;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Confidence, sources and similar annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Diagnostic overview of one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    /// Messages currently held in the window
    pub total_messages: usize,
    /// Messages ever appended, evicted ones included
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub recent_topics: Vec<String>,
}

/// Context window plus summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub conversation_id: String,
    pub messages: Vec<ConversationMessage>,
    pub summary: Option<ConversationSummary>,
}

struct Conversation {
    messages: VecDeque<ConversationMessage>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    message_count: u64,
}

impl Conversation {
    fn new(capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            messages: VecDeque::with_capacity(capacity),
            created_at: now,
            last_updated: now,
            message_count: 0,
        }
    }
}

/// Per-conversation message windows
///
/// Appends to different conversations never contend on a single lock.
/// Concurrent appends to the same conversation are not ordered.
pub struct ConversationMemory {
    conversations: DashMap<String, Conversation>,
    max_messages: usize,
    context_window: usize,
}

impl ConversationMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self::with_limits(config.max_messages, config.context_window)
    }

    pub fn with_limits(max_messages: usize, context_window: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            max_messages: max_messages.max(1),
            context_window: context_window.max(1),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Append a message, evicting the oldest one when the window is full
    pub fn add_message(&self, conversation_id: &str, message: ConversationMessage) {
        let mut conversation = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation::new(self.max_messages));

        conversation.messages.push_back(message);
        conversation.last_updated = Utc::now();
        conversation.message_count += 1;

        let mut evicted = 0u64;
        while conversation.messages.len() > self.max_messages {
            conversation.messages.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            debug!(conversation_id, evicted, "Evicted oldest conversation messages");
            metrics::record_eviction(evicted);
        }
    }

    /// The most recent `window` messages, oldest first; empty for unknown ids
    pub fn get_context(&self, conversation_id: &str, window: usize) -> Vec<ConversationMessage> {
        self.conversations
            .get(conversation_id)
            .map(|conversation| {
                let skip = conversation.messages.len().saturating_sub(window);
                conversation.messages.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Context with the configured window
    pub fn context(&self, conversation_id: &str) -> Vec<ConversationMessage> {
        self.get_context(conversation_id, self.context_window)
    }

    /// Number of messages held for a conversation
    pub fn len(&self, conversation_id: &str) -> usize {
        self.conversations
            .get(conversation_id)
            .map(|conversation| conversation.messages.len())
            .unwrap_or(0)
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn summary(&self, conversation_id: &str) -> Option<ConversationSummary> {
        self.conversations.get(conversation_id).map(|conversation| {
            let skip = conversation.messages.len().saturating_sub(TOPIC_SCAN_MESSAGES);
            let recent: Vec<&ConversationMessage> = conversation.messages.iter().skip(skip).collect();

            ConversationSummary {
                conversation_id: conversation_id.to_string(),
                total_messages: conversation.messages.len(),
                message_count: conversation.message_count,
                created_at: conversation.created_at,
                last_updated: conversation.last_updated,
                recent_topics: extract_topics(&recent),
            }
        })
    }

    pub fn history(&self, conversation_id: &str) -> ConversationHistory {
        ConversationHistory {
            conversation_id: conversation_id.to_string(),
            messages: self.context(conversation_id),
            summary: self.summary(conversation_id),
        }
    }

    /// Forget a conversation; false when it was not known
    pub fn clear(&self, conversation_id: &str) -> bool {
        self.conversations.remove(conversation_id).is_some()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

/// Longer alphabetic words from user turns, first occurrence order
fn extract_topics(messages: &[&ConversationMessage]) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();

    for message in messages.iter().filter(|m| m.role == MessageRole::User) {
        for word in message.content.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.chars().count() > 4
                && word.chars().all(char::is_alphabetic)
                && !topics.contains(&word)
            {
                topics.push(word);
            }
        }
    }

    topics.truncate(MAX_TOPICS);
    topics
}

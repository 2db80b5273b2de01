//! Query Analyzer - classifies intent and extracts entity hints
//!
//! Provides:
//! - Intent classification over fixed keyword vocabularies
//! - Capitalized-token entity extraction
//! - Query type detection
//! - Complexity scoring
//! - Pronoun resolution against prior user turns

use crate::types::{QueryIntent, QueryType, RetrievalContext, RetrievalQuery};
use agentrag_common::config::RetrievalConfig;
use agentrag_common::errors::{AppError, Result};
use tracing::{debug, warn};
use uuid::Uuid;

const ENTITY_WORDS: &[&str] = &["who", "what", "where", "when", "which", "whom", "whose"];

const RELATIONSHIP_WORDS: &[&str] = &[
    "how", "why", "relationship", "relationships", "related", "relate", "connected",
    "connection", "connections", "connect", "link", "linked", "between",
];

const FILTER_WORDS: &[&str] = &["filter", "filtered", "having", "without", "excluding", "only"];

const COMPARISON_WORDS: &[&str] = &[
    "greater", "less", "fewer", "before", "after", "above", "below", "newer", "older",
    "earlier", "later", "exceeding",
];

const COMPARISON_PHRASES: &[&str] = &["at least", "at most", "more than"];

const CONNECTIVES: &[&str] = &["and", "or", "not", "but", "except"];

const QUESTION_WORDS: &[&str] = &["who", "what", "where", "when", "why", "how"];

const PRONOUNS: &[&str] = &[
    "it", "they", "them", "this", "that", "these", "those", "he", "she", "him", "her", "its",
    "their",
];

const IMPERATIVES: &[&str] = &[
    "tell", "show", "list", "find", "give", "describe", "explain", "compare",
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "and", "or", "but", "not", "this", "that", "these", "those",
    "it", "its", "as", "do", "does", "did", "has", "have", "had", "can", "could", "will",
    "would", "should", "may", "might", "i", "we", "you", "they", "he", "she", "please",
];

/// Characters that end an entity group when they trail a token
const GROUP_BREAKS: &[char] = &[',', ';', ':', '?', '!'];

/// Normalisation constants for the complexity components
const LENGTH_NORM: f32 = 200.0;
const ENTITY_NORM: f32 = 10.0;
const CONNECTIVE_NORM: f32 = 5.0;
const QUESTION_NORM: f32 = 3.0;

/// Query analyzer
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    max_query_chars: usize,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(&RetrievalConfig::default())
    }
}

impl QueryAnalyzer {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            max_query_chars: config.max_query_chars,
        }
    }

    /// Analyze a query, falling back to a general search on malformed input
    pub fn analyze(&self, text: &str, context: Option<&RetrievalContext>) -> RetrievalQuery {
        match self.try_analyze(text, context) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "Query analysis failed, using general search");
                let mut query = RetrievalQuery::fallback(text);
                query.context = context.cloned();
                query
            }
        }
    }

    /// Analyze a query
    pub fn try_analyze(&self, text: &str, context: Option<&RetrievalContext>) -> Result<RetrievalQuery> {
        let text = text.trim();
        self.check_input(text)?;

        let tokens: Vec<String> = text.split_whitespace().map(normalize_token).collect();

        let intent = detect_intent(&tokens);
        let query_type = detect_query_type(&tokens);

        let mut entities = extract_entities(text);
        if entities.is_empty() && has_pronoun(&tokens) {
            if let Some(carried) = context.and_then(|ctx| entities_from_history(&ctx.history)) {
                debug!(entities = ?carried, "Resolved pronoun against conversation history");
                entities = carried;
            }
        }

        let complexity_score = complexity(text, entities.len(), &tokens);

        let filters = context
            .map(|ctx| ctx.filters.clone())
            .filter(|filters| !filters.is_empty());

        debug!(
            intent = intent.as_str(),
            entities = entities.len(),
            complexity = complexity_score,
            "Query analyzed"
        );

        Ok(RetrievalQuery {
            id: Uuid::new_v4(),
            text: text.to_string(),
            intent,
            entities_mentioned: entities,
            query_type,
            complexity_score,
            filters,
            context: context.cloned(),
        })
    }

    fn check_input(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(AppError::QueryAnalysis {
                message: "query is empty".to_string(),
            });
        }

        let chars = text.chars().count();
        if chars > self.max_query_chars {
            return Err(AppError::QueryAnalysis {
                message: format!("query has {} characters, limit is {}", chars, self.max_query_chars),
            });
        }

        if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return Err(AppError::QueryAnalysis {
                message: "query contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

fn normalize_token(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

fn contains_any(tokens: &[String], vocabulary: &[&str]) -> bool {
    tokens.iter().any(|t| vocabulary.contains(&t.as_str()))
}

fn count_of(tokens: &[String], vocabulary: &[&str]) -> usize {
    tokens.iter().filter(|t| vocabulary.contains(&t.as_str())).count()
}

fn contains_phrase(tokens: &[String], phrases: &[&str]) -> bool {
    let joined = format!(" {} ", tokens.join(" "));
    phrases.iter().any(|p| joined.contains(&format!(" {} ", p)))
}

/// Relationship cues win over filter cues, which win over entity questions
fn detect_intent(tokens: &[String]) -> QueryIntent {
    if contains_any(tokens, RELATIONSHIP_WORDS) {
        QueryIntent::RelationshipExploration
    } else if contains_any(tokens, FILTER_WORDS)
        || contains_any(tokens, COMPARISON_WORDS)
        || contains_phrase(tokens, COMPARISON_PHRASES)
    {
        QueryIntent::FilteredSearch
    } else if contains_any(tokens, ENTITY_WORDS) {
        QueryIntent::EntityLookup
    } else {
        QueryIntent::GeneralSearch
    }
}

fn detect_query_type(tokens: &[String]) -> QueryType {
    if contains_any(tokens, &["similar", "like"]) {
        QueryType::Similarity
    } else if tokens.iter().any(|t| t == "path" || t == "paths" || t.starts_with("connect")) {
        QueryType::PathFinding
    } else if contains_any(tokens, &["all", "list"]) {
        QueryType::Comprehensive
    } else {
        QueryType::Targeted
    }
}

fn has_pronoun(tokens: &[String]) -> bool {
    contains_any(tokens, PRONOUNS)
}

/// Group consecutive capitalized tokens into entity names
fn extract_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    let flush = |current: &mut Vec<String>, entities: &mut Vec<String>| {
        if current.is_empty() {
            return;
        }
        let name = current.join(" ");
        current.clear();
        if !entities.iter().any(|e| e.eq_ignore_ascii_case(&name)) {
            entities.push(name);
        }
    };

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let lower = word.to_lowercase();

        let capitalized = word.chars().next().map(char::is_uppercase).unwrap_or(false);
        let excluded = STOP_WORDS.contains(&lower.as_str())
            || QUESTION_WORDS.contains(&lower.as_str())
            || IMPERATIVES.contains(&lower.as_str());

        if capitalized && !excluded && word.chars().count() >= 2 {
            current.push(word.to_string());
        } else {
            flush(&mut current, &mut entities);
        }

        if raw.ends_with(GROUP_BREAKS) {
            flush(&mut current, &mut entities);
        }
    }
    flush(&mut current, &mut entities);

    entities
}

/// Entities of the most recent prior turn that mentions any
fn entities_from_history(history: &[String]) -> Option<Vec<String>> {
    history
        .iter()
        .rev()
        .map(|turn| extract_entities(turn))
        .find(|entities| !entities.is_empty())
}

fn complexity(text: &str, entity_count: usize, tokens: &[String]) -> f32 {
    let length = (text.chars().count() as f32 / LENGTH_NORM).min(1.0);
    let entities = (entity_count as f32 / ENTITY_NORM).min(1.0);
    let connectives = (count_of(tokens, CONNECTIVES) as f32 / CONNECTIVE_NORM).min(1.0);
    let questions = (count_of(tokens, QUESTION_WORDS) as f32 / QUESTION_NORM).min(1.0);

    (length * 0.3 + entities * 0.3 + connectives * 0.2 + questions * 0.2).clamp(0.0, 1.0)
}

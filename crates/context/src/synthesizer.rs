//! Answer Synthesizer - Turns retrieved evidence into an answer
//!
//! Provides:
//! - Context-grounded prompts for a language model
//! - Citation extraction from model answers
//! - A deterministic extractive answer when no model is available or it fails

use crate::memory::{ConversationMessage, MessageRole};
use agentrag_common::errors::{AppError, Result};
use agentrag_common::llm::LanguageModel;
use agentrag_common::metrics;
use agentrag_retrieval::fusion;
use agentrag_retrieval::RetrievalResult;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Conversation turns included in the prompt
const PROMPT_CONTEXT_MESSAGES: usize = 3;

/// Results included in the prompt
const PROMPT_RESULTS: usize = 5;

/// Supporting snippets after the top result in an extractive answer
const SUPPORTING_SNIPPETS: usize = 2;

const NO_RESULTS_ANSWER: &str = "I couldn't find specific information to answer your query. \
Please try rephrasing your question or providing more context.";

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Model,
    Extractive,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Model => "model",
            AnswerSource::Extractive => "extractive",
        }
    }
}

impl fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthesized answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub answer: String,
    pub source: AnswerSource,
    /// Model used, when one produced the answer
    pub model: Option<String>,
    /// 1-based indices of prompt results the answer cites
    pub citations: Vec<usize>,
    /// Why the model answer was abandoned, if it was
    pub generation_error: Option<String>,
}

/// Answer generation with an optional language model
pub struct Synthesizer {
    model: Option<Arc<dyn LanguageModel>>,
    citation_pattern: Regex,
}

impl Synthesizer {
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Result<Self> {
        let citation_pattern = Regex::new(r"\[(\d+)\]").map_err(|e| AppError::Internal {
            message: format!("Invalid citation pattern: {}", e),
        })?;

        Ok(Self { model, citation_pattern })
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Answer from the model when possible, extractively otherwise
    ///
    /// Without results there is nothing to ground a model answer on, so the
    /// extractive path explains that nothing was found.
    pub async fn synthesize(
        &self,
        query: &str,
        results: &[RetrievalResult],
        context: &[ConversationMessage],
    ) -> SynthesizedAnswer {
        let model = match &self.model {
            Some(model) if !results.is_empty() => model,
            _ => return self.extractive(results, None),
        };

        let prompt = build_prompt(query, results, context);
        match model.generate(&prompt).await {
            Ok(answer) => {
                let citations = self.extract_citations(&answer, results.len().min(PROMPT_RESULTS));
                debug!(model = model.model_name(), citations = citations.len(), "Model answer generated");
                metrics::record_answer(AnswerSource::Model.as_str());

                SynthesizedAnswer {
                    answer,
                    source: AnswerSource::Model,
                    model: Some(model.model_name().to_string()),
                    citations,
                    generation_error: None,
                }
            }
            Err(e) => {
                warn!(model = model.model_name(), error = %e, "Answer generation failed, using extractive answer");
                self.extractive(results, Some(e.to_string()))
            }
        }
    }

    fn extractive(&self, results: &[RetrievalResult], generation_error: Option<String>) -> SynthesizedAnswer {
        metrics::record_answer(AnswerSource::Extractive.as_str());

        SynthesizedAnswer {
            answer: extractive_answer(results),
            source: AnswerSource::Extractive,
            model: None,
            citations: (1..=results.len().min(SUPPORTING_SNIPPETS + 1)).collect(),
            generation_error,
        }
    }

    /// Distinct `[n]` references with `1 <= n <= available`, ascending
    pub fn extract_citations(&self, answer: &str, available: usize) -> Vec<usize> {
        let mut citations: Vec<usize> = self
            .citation_pattern
            .captures_iter(answer)
            .filter_map(|cap| cap.get(1))
            .filter_map(|m| m.as_str().parse::<usize>().ok())
            .filter(|&index| index > 0 && index <= available)
            .collect();

        citations.sort_unstable();
        citations.dedup();
        citations
    }
}

/// Prompt with recent conversation turns and the top results
pub fn build_prompt(query: &str, results: &[RetrievalResult], context: &[ConversationMessage]) -> String {
    let skip = context.len().saturating_sub(PROMPT_CONTEXT_MESSAGES);
    let conversation: Vec<String> = context
        .iter()
        .skip(skip)
        .map(|message| format!("{}: {}", role_label(message), message.content))
        .collect();

    let retrieved: Vec<String> = results
        .iter()
        .take(PROMPT_RESULTS)
        .enumerate()
        .map(|(i, result)| format!("[{}] {} (confidence: {:.2})", i + 1, result.content, result.score))
        .collect();

    format!(
        "Based on the following context and retrieved information, please provide a comprehensive answer to the user's query.\n\n\
        Conversation Context:\n{}\n\n\
        Retrieved Information:\n{}\n\n\
        User Query: {}\n\n\
        Please provide a helpful, accurate, and well-structured response. Cite retrieved information as [1], [2], etc. \
        If the retrieved information doesn't fully answer the query, acknowledge the limitations and provide what information is available.",
        conversation.join("\n"),
        retrieved.join("\n"),
        query
    )
}

fn role_label(message: &ConversationMessage) -> &'static str {
    match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

/// Top result, up to two supporting snippets and a note on the evidence used
pub fn extractive_answer(results: &[RetrievalResult]) -> String {
    let Some(top) = results.first() else {
        return NO_RESULTS_ANSWER.to_string();
    };

    let mut answer = format!("Based on the available information, here's what I found:\n\n{}\n\n", top.content);

    if results.len() > 1 {
        answer.push_str("Additional relevant information:\n");
        for result in results.iter().skip(1).take(SUPPORTING_SNIPPETS) {
            answer.push_str(&format!("• {}\n", result.content));
        }
    }

    answer.push_str(&format!(
        "\n(This response is based on {} sources with an average confidence of {:.2})",
        results.len(),
        fusion::mean_score(results)
    ));
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrag_retrieval::{Metadata, SourceType};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn result(content: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            id: content.to_lowercase(),
            content: content.to_string(),
            score,
            source_type: SourceType::Vector,
            metadata: Metadata::new(),
            reasoning: None,
        }
    }

    struct ScriptedModel {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(reply: std::result::Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|message| AppError::Generation { message })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_extractive_answer_layout() {
        let results = vec![
            result("Steve Jobs co-founded Apple.", 0.9),
            result("Apple is based in Cupertino.", 0.7),
            result("Apple makes the iPhone.", 0.5),
            result("Bananas are yellow.", 0.3),
        ];

        let answer = extractive_answer(&results);
        assert!(answer.starts_with("Based on the available information"));
        assert!(answer.contains("Steve Jobs co-founded Apple."));
        assert!(answer.contains("• Apple is based in Cupertino."));
        assert!(answer.contains("• Apple makes the iPhone."));
        assert!(!answer.contains("Bananas"));
        assert!(answer.contains("based on 4 sources with an average confidence of 0.60"));
    }

    #[test]
    fn test_extractive_answer_without_results() {
        assert_eq!(extractive_answer(&[]), NO_RESULTS_ANSWER);
    }

    #[test]
    fn test_prompt_contents() {
        let context: Vec<_> = (0..5)
            .map(|i| ConversationMessage::new(MessageRole::User, format!("turn {}", i)))
            .collect();
        let results: Vec<_> = (0..7).map(|i| result(&format!("fact {}", i), 0.8)).collect();

        let prompt = build_prompt("What is Apple?", &results, &context);
        assert!(!prompt.contains("turn 1"));
        assert!(prompt.contains("user: turn 2"));
        assert!(prompt.contains("user: turn 4"));
        assert!(prompt.contains("[5] fact 4 (confidence: 0.80)"));
        assert!(!prompt.contains("fact 5"));
        assert!(prompt.contains("User Query: What is Apple?"));
    }

    #[test]
    fn test_citation_extraction() {
        let synthesizer = Synthesizer::new(None).unwrap();
        let citations = synthesizer.extract_citations("Jobs [2] founded Apple [1][2], see [9] and [0].", 3);
        assert_eq!(citations, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_model_answer_with_citations() {
        let model = ScriptedModel::new(Ok("Steve Jobs co-founded Apple [1]."));
        let synthesizer = Synthesizer::new(Some(model.clone())).unwrap();
        let results = vec![result("Steve Jobs co-founded Apple.", 0.9)];

        let answer = synthesizer.synthesize("Who founded Apple?", &results, &[]).await;
        assert_eq!(answer.source, AnswerSource::Model);
        assert_eq!(answer.model.as_deref(), Some("scripted"));
        assert_eq!(answer.citations, vec![1]);
        assert!(answer.generation_error.is_none());
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let model = ScriptedModel::new(Err("rate limited"));
        let synthesizer = Synthesizer::new(Some(model)).unwrap();
        let results = vec![result("Steve Jobs co-founded Apple.", 0.9)];

        let answer = synthesizer.synthesize("Who founded Apple?", &results, &[]).await;
        assert_eq!(answer.source, AnswerSource::Extractive);
        assert!(answer.answer.contains("Steve Jobs co-founded Apple."));
        assert!(answer.generation_error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_no_results_skips_model() {
        let model = ScriptedModel::new(Ok("made up"));
        let synthesizer = Synthesizer::new(Some(model.clone())).unwrap();

        let answer = synthesizer.synthesize("Who founded Apple?", &[], &[]).await;
        assert_eq!(answer.source, AnswerSource::Extractive);
        assert_eq!(answer.answer, NO_RESULTS_ANSWER);
        assert!(answer.citations.is_empty());
        assert!(model.prompts.lock().unwrap().is_empty());
    }
}

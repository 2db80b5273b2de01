//! Reasoning Engine - Explains how an answer was reached
//!
//! Produces an ordered chain of timed steps:
//! - Query analysis
//! - Information retrieval
//! - Evidence synthesis
//!
//! The reasoning stream appends a final response step once the answer exists.

use crate::memory::{ConversationMessage, MessageRole};
use agentrag_retrieval::fusion;
use agentrag_retrieval::{RetrievalQuery, RetrievalResponse, RetrievalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

/// Confidence of the deterministic analysis step
const ANALYSIS_CONFIDENCE: f32 = 0.9;

const SYNTHESIS_BASE: f32 = 0.7;
const MULTI_SOURCE_BOOST: f32 = 0.1;
const HIGH_SCORE_THRESHOLD: f32 = 0.8;
const HIGH_SCORE_BOOST: f32 = 0.05;
const HIGH_SCORE_BOOST_CAP: f32 = 0.2;

/// Prior user turns quoted when the query refers back
const REFERENCE_TURNS: usize = 2;

const REFERENCE_WORDS: &[&str] = &["this", "that", "it", "they", "them"];

/// Kind of reasoning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    QueryAnalysis,
    InformationRetrieval,
    EvidenceSynthesis,
    Response,
}

/// One timed step of the reasoning chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_id: Uuid,
    pub step_type: StepType,
    pub description: String,
    pub input_data: Value,
    pub output_data: Value,
    /// Within [0, 1]
    pub confidence: f32,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn new(
        step_type: StepType,
        description: impl Into<String>,
        input_data: Value,
        output_data: Value,
        confidence: f32,
        started: Instant,
    ) -> Self {
        Self {
            step_id: Uuid::new_v4(),
            step_type,
            description: description.into(),
            input_data,
            output_data,
            confidence: confidence.clamp(0.0, 1.0),
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        }
    }
}

/// Builds reasoning chains from retrieval outcomes
#[derive(Debug, Clone, Default)]
pub struct ReasoningEngine;

impl ReasoningEngine {
    pub fn new() -> Self {
        Self
    }

    /// Analysis, retrieval and synthesis steps, in that order
    pub fn reasoning_chain(
        &self,
        query: &RetrievalQuery,
        context: &[ConversationMessage],
        response: &RetrievalResponse,
    ) -> Vec<ReasoningStep> {
        vec![
            self.analysis_step(query, context),
            self.retrieval_step(query, response),
            self.synthesis_step(&response.results, context),
        ]
    }

    fn analysis_step(&self, query: &RetrievalQuery, context: &[ConversationMessage]) -> ReasoningStep {
        let started = Instant::now();

        let output = json!({
            "intent": query.intent,
            "query_type": query.query_type,
            "query_length": query.text.chars().count(),
            "complexity": query.complexity_score,
            "entities_mentioned": query.entities_mentioned,
            "context_references": context_references(&query.text, context),
        });

        ReasoningStep::new(
            StepType::QueryAnalysis,
            "Analyzed user query and conversation context",
            json!({ "query": query.text, "context_messages": context.len() }),
            output,
            ANALYSIS_CONFIDENCE,
            started,
        )
    }

    fn retrieval_step(&self, query: &RetrievalQuery, response: &RetrievalResponse) -> ReasoningStep {
        let started = Instant::now();
        let results = &response.results;
        let mean = fusion::mean_score(results);

        let tool_errors: Vec<Value> = response
            .reasoning_chain
            .iter()
            .filter(|record| record.is_error())
            .map(|record| json!({ "step": record.step, "tool": record.tool, "error": record.error }))
            .collect();

        let output = json!({
            "sources_found": results.len(),
            "source_types": fusion::distinct_sources(results),
            "avg_confidence": mean,
            "top_result_score": results.iter().map(|r| r.score).fold(0.0f32, f32::max),
            "strategy_used": response.strategy_used,
            "tool_errors": tool_errors,
        });

        ReasoningStep::new(
            StepType::InformationRetrieval,
            "Retrieved relevant information from knowledge base",
            json!({ "query_intent": query.intent, "strategy": response.strategy_used }),
            output,
            mean,
            started,
        )
    }

    fn synthesis_step(&self, results: &[RetrievalResult], context: &[ConversationMessage]) -> ReasoningStep {
        let started = Instant::now();
        let confidence = synthesis_confidence(results);

        let mut groups: BTreeMap<&'static str, usize> = BTreeMap::new();
        for result in results {
            *groups.entry(result.source_type.as_str()).or_default() += 1;
        }

        let output = json!({
            "synthesis_confidence": confidence,
            "evidence_groups": groups,
            "supporting_evidence_count": results.len(),
            "context_integration": !context.is_empty(),
        });

        ReasoningStep::new(
            StepType::EvidenceSynthesis,
            "Synthesized evidence from multiple sources",
            json!({ "sources_count": results.len() }),
            output,
            confidence,
            started,
        )
    }
}

/// 0.7 base, +0.1 for several source types, +0.05 per high-scoring result up to +0.2
pub fn synthesis_confidence(results: &[RetrievalResult]) -> f32 {
    let mut confidence = SYNTHESIS_BASE;

    if fusion::distinct_sources(results).len() > 1 {
        confidence += MULTI_SOURCE_BOOST;
    }

    let high_scoring = results.iter().filter(|r| r.score > HIGH_SCORE_THRESHOLD).count();
    confidence += (high_scoring as f32 * HIGH_SCORE_BOOST).min(HIGH_SCORE_BOOST_CAP);

    confidence.min(1.0)
}

/// Earlier user turns a referring query may depend on
fn context_references(text: &str, context: &[ConversationMessage]) -> Vec<String> {
    let refers_back = text
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| REFERENCE_WORDS.contains(&word.to_lowercase().as_str()));

    if !refers_back {
        return Vec::new();
    }

    let skip = context.len().saturating_sub(REFERENCE_TURNS);
    context
        .iter()
        .skip(skip)
        .filter(|message| message.role == MessageRole::User)
        .map(|message| message.content.clone())
        .collect()
}

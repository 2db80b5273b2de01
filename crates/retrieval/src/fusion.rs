//! Result fusion and confidence scoring

use crate::types::{RetrievalResult, SourceType};
use std::collections::HashSet;

/// Weights of the confidence components
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceWeights {
    pub mean_score: f32,
    pub result_count: f32,
    pub simplicity: f32,
    pub diversity: f32,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            mean_score: 0.5,
            result_count: 0.2,
            simplicity: 0.2,
            diversity: 0.1,
        }
    }
}

/// Drop later results whose content identity was already seen
pub fn deduplicate(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key()))
        .collect()
}

/// Stable sort by descending score
pub fn rank(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Concatenate, deduplicate (first occurrence wins), rank and truncate
pub fn merge(primary: Vec<RetrievalResult>, secondary: Vec<RetrievalResult>, limit: usize) -> Vec<RetrievalResult> {
    let mut combined = primary;
    combined.extend(secondary);

    let mut merged = deduplicate(combined);
    rank(&mut merged);
    merged.truncate(limit);
    merged
}

pub fn mean_score(results: &[RetrievalResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32
}

pub fn distinct_sources(results: &[RetrievalResult]) -> Vec<SourceType> {
    let mut sources: Vec<SourceType> = results.iter().map(|r| r.source_type).collect();
    sources.sort();
    sources.dedup();
    sources
}

/// Overall confidence in [0, 1]; zero when nothing was retrieved
pub fn confidence_score(results: &[RetrievalResult], complexity: f32, weights: &ConfidenceWeights) -> f32 {
    if results.is_empty() {
        return 0.0;
    }

    let quality = mean_score(results);
    let count = (results.len() as f32 / 10.0).min(1.0);
    let simplicity = 1.0 - complexity.clamp(0.0, 1.0) * 0.3;
    let diversity = distinct_sources(results).len() as f32 / 3.0;

    let score = quality * weights.mean_score
        + count * weights.result_count
        + simplicity * weights.simplicity
        + diversity * weights.diversity;

    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

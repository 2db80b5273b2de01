//! Strategy Selector
//!
//! Complexity thresholds are checked before the intent table and always win.

use crate::types::{QueryIntent, RetrievalQuery, RetrievalStrategy};
use agentrag_common::config::RetrievalConfig;

/// Maps a classified query to a retrieval strategy
#[derive(Debug, Clone, Copy)]
pub struct StrategySelector {
    low_complexity: f32,
    high_complexity: f32,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(&RetrievalConfig::default())
    }
}

impl StrategySelector {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            low_complexity: config.low_complexity_threshold,
            high_complexity: config.high_complexity_threshold,
        }
    }

    pub fn select(&self, query: &RetrievalQuery) -> RetrievalStrategy {
        self.select_for(query.intent, query.complexity_score)
    }

    /// Pure function of intent and complexity
    pub fn select_for(&self, intent: QueryIntent, complexity: f32) -> RetrievalStrategy {
        if complexity < self.low_complexity {
            return RetrievalStrategy::VectorOnly;
        }
        if complexity > self.high_complexity {
            return RetrievalStrategy::Adaptive;
        }

        match intent {
            QueryIntent::EntityLookup => RetrievalStrategy::VectorOnly,
            QueryIntent::RelationshipExploration => RetrievalStrategy::GraphOnly,
            QueryIntent::FilteredSearch => RetrievalStrategy::FilterOnly,
            QueryIntent::GeneralSearch => RetrievalStrategy::Hybrid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTENTS: [QueryIntent; 4] = [
        QueryIntent::EntityLookup,
        QueryIntent::RelationshipExploration,
        QueryIntent::FilteredSearch,
        QueryIntent::GeneralSearch,
    ];

    #[test]
    fn test_low_complexity_always_vector() {
        let selector = StrategySelector::default();
        for intent in INTENTS {
            for complexity in [0.0, 0.1, 0.29] {
                assert_eq!(selector.select_for(intent, complexity), RetrievalStrategy::VectorOnly);
            }
        }
    }

    #[test]
    fn test_high_complexity_always_adaptive() {
        let selector = StrategySelector::default();
        for intent in INTENTS {
            assert_eq!(selector.select_for(intent, 0.71), RetrievalStrategy::Adaptive);
            assert_eq!(selector.select_for(intent, 1.0), RetrievalStrategy::Adaptive);
        }
    }

    #[test]
    fn test_intent_table_in_middle_band() {
        let selector = StrategySelector::default();
        assert_eq!(selector.select_for(QueryIntent::EntityLookup, 0.5), RetrievalStrategy::VectorOnly);
        assert_eq!(
            selector.select_for(QueryIntent::RelationshipExploration, 0.5),
            RetrievalStrategy::GraphOnly
        );
        assert_eq!(selector.select_for(QueryIntent::FilteredSearch, 0.3), RetrievalStrategy::FilterOnly);
        assert_eq!(selector.select_for(QueryIntent::GeneralSearch, 0.7), RetrievalStrategy::Hybrid);
    }

    #[test]
    fn test_thresholds_from_config() {
        let config = RetrievalConfig {
            low_complexity_threshold: 0.1,
            high_complexity_threshold: 0.2,
            ..RetrievalConfig::default()
        };
        let selector = StrategySelector::new(&config);
        assert_eq!(selector.select_for(QueryIntent::EntityLookup, 0.15), RetrievalStrategy::VectorOnly);
        assert_eq!(selector.select_for(QueryIntent::GeneralSearch, 0.15), RetrievalStrategy::Hybrid);
        assert_eq!(selector.select_for(QueryIntent::GeneralSearch, 0.25), RetrievalStrategy::Adaptive);
    }

    #[test]
    fn test_scenario_queries() {
        use crate::analyzer::QueryAnalyzer;

        let analyzer = QueryAnalyzer::default();
        let selector = StrategySelector::default();

        let simple = analyzer.analyze("Who works for Apple Inc.?", None);
        assert_eq!(selector.select(&simple), RetrievalStrategy::VectorOnly);

        let relational = analyzer.analyze(
            "How are Apple Inc. and Steve Jobs related, and what companies are they connected to?",
            None,
        );
        assert_eq!(selector.select(&relational), RetrievalStrategy::GraphOnly);
    }
}

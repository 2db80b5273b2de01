//! Adaptive Retrieval Orchestrator
//!
//! Executes a retrieval strategy against the configured tools, fuses their
//! results and scores the outcome. Tool failures never abort a request: each
//! one is written to the trace and contributes no results.

use crate::analyzer::QueryAnalyzer;
use crate::fusion::{self, ConfidenceWeights};
use crate::strategy::StrategySelector;
use crate::tools::{SearchConstraints, ToolSet};
use crate::types::{
    RetrievalContext, RetrievalQuery, RetrievalResponse, RetrievalResult, RetrievalStrategy,
    SourceType, TraceRecord,
};
use agentrag_common::config::RetrievalConfig;
use agentrag_common::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Snapshot of the orchestrator's capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalStatistics {
    pub tools_available: BTreeMap<String, bool>,
    pub tool_descriptions: BTreeMap<String, String>,
    pub strategies_supported: Vec<RetrievalStrategy>,
    /// "operational", "degraded" or "unavailable"
    pub system_status: String,
    pub generated_at: DateTime<Utc>,
}

fn tool_name(source: SourceType) -> &'static str {
    match source {
        SourceType::Vector => "vector_search",
        SourceType::Graph => "graph_traversal",
        SourceType::Filter => "logical_filter",
    }
}

/// Per-request execution state
struct Run<'a> {
    query: &'a RetrievalQuery,
    constraints: SearchConstraints,
    trace: Vec<TraceRecord>,
    succeeded: usize,
}

/// The central retrieval decision maker
pub struct AdaptiveRetrieval {
    analyzer: QueryAnalyzer,
    selector: StrategySelector,
    tools: ToolSet,
    default_strategy: Option<RetrievalStrategy>,
    default_max_results: usize,
    max_results_limit: usize,
    quality_threshold: f32,
    graph_depth: usize,
    weights: ConfidenceWeights,
}

impl AdaptiveRetrieval {
    pub fn new(tools: ToolSet, config: &RetrievalConfig) -> Self {
        let default_strategy = config.default_strategy.as_deref().and_then(|name| {
            name.parse::<RetrievalStrategy>()
                .map_err(|e| warn!(error = %e, "Ignoring configured default strategy"))
                .ok()
        });

        Self {
            analyzer: QueryAnalyzer::new(config),
            selector: StrategySelector::new(config),
            tools,
            default_strategy,
            default_max_results: config.default_max_results.max(1),
            max_results_limit: config.max_results_limit.max(1),
            quality_threshold: config.adaptive_quality_threshold,
            graph_depth: config.graph_depth.max(1),
            weights: ConfidenceWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: ConfidenceWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Analyze and retrieve in one call
    pub async fn retrieve(
        &self,
        query_text: &str,
        strategy: Option<RetrievalStrategy>,
        max_results: usize,
        context: Option<&RetrievalContext>,
    ) -> RetrievalResponse {
        let query = self.analyzer.analyze(query_text, context);
        self.execute(&query, strategy, max_results).await
    }

    /// Retrieve for an already analyzed query
    #[instrument(skip(self, query), fields(query_id = %query.id))]
    pub async fn execute(
        &self,
        query: &RetrievalQuery,
        strategy: Option<RetrievalStrategy>,
        max_results: usize,
    ) -> RetrievalResponse {
        let start = Instant::now();
        let max_results = self.effective_max_results(max_results);

        let (strategy, selected_by) = match (strategy, self.default_strategy) {
            (Some(s), _) => (s, "caller"),
            (None, Some(s)) => (s, "configuration"),
            (None, None) => (self.selector.select(query), "selector"),
        };

        let mut run = Run {
            query,
            constraints: SearchConstraints::for_query(query, self.graph_depth),
            trace: Vec::new(),
            succeeded: 0,
        };

        run.trace.push(TraceRecord::step(
            "strategy_selection",
            json!({
                "strategy": strategy,
                "selected_by": selected_by,
                "intent": query.intent,
                "complexity": query.complexity_score,
                "entities": query.entities_mentioned,
                "max_results": max_results,
            }),
        ));

        let mut results = match strategy {
            RetrievalStrategy::VectorOnly => self.invoke(&mut run, SourceType::Vector, max_results, "vector_search").await,
            RetrievalStrategy::GraphOnly => self.invoke(&mut run, SourceType::Graph, max_results, "graph_search").await,
            RetrievalStrategy::FilterOnly => self.invoke(&mut run, SourceType::Filter, max_results, "logical_filter").await,
            RetrievalStrategy::Hybrid => self.hybrid(&mut run, max_results).await,
            RetrievalStrategy::Adaptive => self.adaptive(&mut run, max_results).await,
        };

        fusion::rank(&mut results);
        results.truncate(max_results);

        if run.succeeded == 0 {
            warn!(strategy = strategy.as_str(), "No retrieval tool produced a usable answer");
            run.trace.push(TraceRecord::step(
                "no_usable_results",
                json!({ "reason": "every tool selected by the strategy failed or is not configured" }),
            ));
        }

        let confidence_score = fusion::confidence_score(&results, query.complexity_score, &self.weights);
        let elapsed = start.elapsed();
        metrics::record_retrieval(elapsed.as_secs_f64(), strategy.as_str(), results.len());

        info!(
            strategy = strategy.as_str(),
            results = results.len(),
            confidence = confidence_score,
            elapsed_ms = elapsed.as_millis() as u64,
            "Retrieval completed"
        );

        RetrievalResponse {
            query_id: query.id,
            strategy_used: strategy,
            total_results: results.len(),
            results,
            reasoning_chain: run.trace,
            processing_time_ms: elapsed.as_secs_f64() * 1000.0,
            confidence_score,
        }
    }

    fn effective_max_results(&self, requested: usize) -> usize {
        let requested = if requested == 0 { self.default_max_results } else { requested };
        requested.min(self.max_results_limit)
    }

    /// Invoke one tool; failures are traced and yield no results
    async fn invoke(&self, run: &mut Run<'_>, source: SourceType, top_k: usize, step: &str) -> Vec<RetrievalResult> {
        let name = tool_name(source);
        let parameters = json!({
            "top_k": top_k,
            "entities": run.query.entities_mentioned,
            "filters": run.constraints.filters.len(),
            "max_depth": run.constraints.max_depth,
        });

        let Some(tool) = self.tools.get(source) else {
            run.trace.push(TraceRecord::tool_call(step, name, parameters, Err("tool not configured".to_string())));
            return Vec::new();
        };

        let start = Instant::now();
        let outcome = tool.search(run.query, &run.constraints, top_k).await;
        metrics::record_tool_call(tool.name(), start.elapsed().as_secs_f64(), outcome.is_ok());

        match outcome {
            Ok(results) => {
                run.succeeded += 1;
                run.trace.push(TraceRecord::tool_call(step, tool.name(), parameters, Ok(results.len())));
                results
            }
            Err(e) => {
                if e.is_upstream() {
                    warn!(tool = tool.name(), error = %e, "Retrieval tool unavailable, continuing without it");
                } else {
                    warn!(tool = tool.name(), error = %e, "Retrieval tool rejected the request, continuing without it");
                }
                run.trace.push(TraceRecord::tool_call(step, tool.name(), parameters, Err(e.to_string())));
                Vec::new()
            }
        }
    }

    async fn hybrid(&self, run: &mut Run<'_>, max_results: usize) -> Vec<RetrievalResult> {
        let half = (max_results / 2).max(1);

        let vector = self.invoke(run, SourceType::Vector, half, "hybrid_vector").await;
        let graph = self.invoke(run, SourceType::Graph, half, "hybrid_graph").await;
        let (vector_count, graph_count) = (vector.len(), graph.len());

        let merged = fusion::merge(vector, graph, max_results);
        run.trace.push(TraceRecord::step(
            "hybrid_combination",
            json!({
                "vector_results": vector_count,
                "graph_results": graph_count,
                "combined_unique": merged.len(),
            }),
        ));
        merged
    }

    /// Cheap vector pass first; supplement it when good, broaden when poor
    async fn adaptive(&self, run: &mut Run<'_>, max_results: usize) -> Vec<RetrievalResult> {
        let third = (max_results / 3).max(1);

        let initial = self.invoke(run, SourceType::Vector, third, "adaptive_initial").await;
        let initial_quality = fusion::mean_score(&initial);
        let supplement = !initial.is_empty() && initial_quality > self.quality_threshold;

        let results = if supplement {
            let graph = self.invoke(run, SourceType::Graph, third, "adaptive_supplement").await;
            fusion::merge(initial, graph, max_results)
        } else {
            self.hybrid(run, max_results).await
        };

        run.trace.push(TraceRecord::step(
            "adaptive_decision",
            json!({
                "initial_quality": initial_quality,
                "threshold": self.quality_threshold,
                "branch": if supplement { "supplement_with_graph" } else { "escalate_to_hybrid" },
                "final_count": results.len(),
            }),
        ));
        results
    }

    /// Tools available, strategies supported and overall status
    pub fn statistics(&self) -> RetrievalStatistics {
        let mut tools_available = BTreeMap::new();
        let mut tool_descriptions = BTreeMap::new();

        for source in [SourceType::Vector, SourceType::Graph, SourceType::Filter] {
            let tool = self.tools.get(source);
            tools_available.insert(tool_name(source).to_string(), tool.is_some());
            if let Some(tool) = tool {
                tool_descriptions.insert(tool.name().to_string(), tool.description().to_string());
            }
        }

        let available = tools_available.values().filter(|v| **v).count();
        let system_status = match available {
            0 => "unavailable",
            3 => "operational",
            _ => "degraded",
        };

        RetrievalStatistics {
            tools_available,
            tool_descriptions,
            strategies_supported: RetrievalStrategy::ALL.to_vec(),
            system_status: system_status.to_string(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryVectorIndex;
    use crate::tools::testing::{result, FailingTool, FixedTool};
    use crate::tools::SimilaritySearchTool;
    use crate::types::{FilterCondition, FilterOperator, Metadata};
    use agentrag_common::embeddings::{Embedder, MockEmbedder};
    use std::sync::Arc;

    fn vector_results(scores: &[f32]) -> Vec<RetrievalResult> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| result(&format!("v{}", i), &format!("vector passage {}", i), *s, SourceType::Vector))
            .collect()
    }

    fn graph_results(n: usize) -> Vec<RetrievalResult> {
        (0..n)
            .map(|i| result(&format!("g{}", i), &format!("graph triple {}", i), 0.5, SourceType::Graph))
            .collect()
    }

    fn orchestrator(tools: ToolSet) -> AdaptiveRetrieval {
        AdaptiveRetrieval::new(tools, &RetrievalConfig::default())
    }

    fn tool_steps(response: &RetrievalResponse) -> Vec<&str> {
        response
            .reasoning_chain
            .iter()
            .filter(|t| t.tool.is_some())
            .map(|t| t.step.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_simple_query_uses_vector_only() {
        let vector = FixedTool::new("vector_search", SourceType::Vector, vector_results(&[0.9, 0.8]));
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(2));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector.clone()).with_graph(graph.clone()));

        let response = retrieval.retrieve("Who works for Apple Inc.?", None, 10, None).await;

        assert_eq!(response.strategy_used, RetrievalStrategy::VectorOnly);
        assert_eq!(response.total_results, 2);
        assert_eq!(vector.calls(), 1);
        assert_eq!(graph.calls(), 0);
        assert!(response.confidence_score > 0.0 && response.confidence_score <= 1.0);
    }

    #[tokio::test]
    async fn test_adaptive_supplements_good_vector_results() {
        let vector = FixedTool::new("vector_search", SourceType::Vector, vector_results(&[0.9, 0.85, 0.8]));
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(5));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector.clone()).with_graph(graph.clone()));

        let response = retrieval
            .retrieve("anything", Some(RetrievalStrategy::Adaptive), 9, None)
            .await;

        assert_eq!(vector.requested(), vec![3]);
        assert_eq!(graph.requested(), vec![3]);
        assert_eq!(tool_steps(&response), vec!["adaptive_initial", "adaptive_supplement"]);
        assert_eq!(response.total_results, 6);

        let decision = response.reasoning_chain.iter().find(|t| t.step == "adaptive_decision").unwrap();
        assert_eq!(decision.parameters["branch"], json!("supplement_with_graph"));
    }

    #[tokio::test]
    async fn test_adaptive_escalates_poor_vector_results() {
        let vector = FixedTool::new("vector_search", SourceType::Vector, vector_results(&[0.4, 0.3, 0.2, 0.1, 0.1]));
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(5));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector.clone()).with_graph(graph.clone()));

        let response = retrieval
            .retrieve("anything", Some(RetrievalStrategy::Adaptive), 9, None)
            .await;

        assert_eq!(vector.requested(), vec![3, 4]);
        assert_eq!(graph.requested(), vec![4]);
        assert_eq!(tool_steps(&response), vec!["adaptive_initial", "hybrid_vector", "hybrid_graph"]);

        let decision = response.reasoning_chain.iter().find(|t| t.step == "adaptive_decision").unwrap();
        assert_eq!(decision.parameters["branch"], json!("escalate_to_hybrid"));
    }

    #[tokio::test]
    async fn test_adaptive_escalates_on_empty_vector_results() {
        let vector = FixedTool::new("vector_search", SourceType::Vector, Vec::new());
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(2));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector.clone()).with_graph(graph));

        let response = retrieval.retrieve("anything", Some(RetrievalStrategy::Adaptive), 10, None).await;

        assert_eq!(vector.calls(), 2);
        assert_eq!(response.total_results, 2);
    }

    #[tokio::test]
    async fn test_hybrid_dedups_and_ranks() {
        let mut graph = graph_results(2);
        graph[0].content = "VECTOR PASSAGE 0 ".to_string();
        graph[0].score = 0.99;

        let vector = FixedTool::new("vector_search", SourceType::Vector, vector_results(&[0.6, 0.3]));
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph);
        let retrieval = orchestrator(ToolSet::new().with_vector(vector).with_graph(graph));

        let response = retrieval.retrieve("anything", Some(RetrievalStrategy::Hybrid), 4, None).await;

        let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["v0", "g1", "v1"]);
        assert!(response.results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_failing_tool_does_not_abort() {
        let vector = Arc::new(FailingTool {
            name: "vector_search",
            source: SourceType::Vector,
        });
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(3));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector).with_graph(graph));

        let response = retrieval.retrieve("anything", Some(RetrievalStrategy::Hybrid), 10, None).await;

        assert_eq!(response.total_results, 3);
        assert!(response.results.iter().all(|r| r.source_type == SourceType::Graph));

        let failed: Vec<_> = response.reasoning_chain.iter().filter(|t| t.is_error()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].tool.as_deref(), Some("vector_search"));
        assert_eq!(failed[0].result_count, Some(0));
    }

    #[tokio::test]
    async fn test_adaptive_escalates_when_vector_is_down() {
        let vector = Arc::new(FailingTool {
            name: "vector_search",
            source: SourceType::Vector,
        });
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(3));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector).with_graph(graph.clone()));

        let response = retrieval.retrieve("anything", Some(RetrievalStrategy::Adaptive), 10, None).await;

        assert_eq!(tool_steps(&response), vec!["adaptive_initial", "hybrid_vector", "hybrid_graph"]);
        assert_eq!(graph.requested(), vec![5]);
        assert_eq!(response.total_results, 3);
        assert!(response.results.iter().all(|r| r.source_type == SourceType::Graph));
        assert!(response.confidence_score > 0.0);

        let failed: Vec<_> = response.reasoning_chain.iter().filter(|t| t.is_error()).collect();
        let failed_steps: Vec<_> = failed.iter().map(|t| t.step.as_str()).collect();
        assert_eq!(failed_steps, vec!["adaptive_initial", "hybrid_vector"]);
        assert!(failed
            .iter()
            .all(|t| t.error.as_deref().is_some_and(|e| e.starts_with("Tool unavailable: vector_search"))));

        let decision = response.reasoning_chain.iter().find(|t| t.step == "adaptive_decision").unwrap();
        assert_eq!(decision.parameters["branch"], json!("escalate_to_hybrid"));
        assert!(!response.reasoning_chain.iter().any(|t| t.step == "no_usable_results"));
    }

    #[tokio::test]
    async fn test_invalid_filter_only_disables_the_filtered_tool() {
        let embedder = Arc::new(MockEmbedder::new(16));
        let index = Arc::new(InMemoryVectorIndex::new());
        index
            .insert("doc-1", "Apple designs phones", embedder.embed("Apple designs phones").await.unwrap(), Metadata::new())
            .await;

        let vector = Arc::new(SimilaritySearchTool::new(embedder, index));
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(2));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector).with_graph(graph));

        let context = RetrievalContext {
            filters: vec![FilterCondition {
                field: "founded".to_string(),
                operator: FilterOperator::In,
                value: json!(1976),
            }],
            ..RetrievalContext::default()
        };

        for strategy in [RetrievalStrategy::Hybrid, RetrievalStrategy::Adaptive] {
            let response = retrieval.retrieve("Apple designs phones", Some(strategy), 10, Some(&context)).await;

            let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["g0", "g1"], "{:?}", strategy);

            let errors: Vec<_> = response.reasoning_chain.iter().filter_map(|t| t.error.as_deref()).collect();
            assert!(!errors.is_empty());
            assert!(errors.iter().all(|e| e.starts_with("Invalid filter on field 'founded'")));
        }
    }

    #[tokio::test]
    async fn test_no_usable_tools_yields_empty_response() {
        let retrieval = orchestrator(ToolSet::new());

        for strategy in RetrievalStrategy::ALL {
            let response = retrieval.retrieve("Who works for Apple Inc.?", Some(strategy), 10, None).await;
            assert!(response.results.is_empty());
            assert_eq!(response.confidence_score, 0.0);
            assert!(response.reasoning_chain.iter().any(|t| t.step == "no_usable_results"));
        }
    }

    #[tokio::test]
    async fn test_every_invocation_is_traced() {
        let vector = FixedTool::new("vector_search", SourceType::Vector, vector_results(&[0.2]));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector));

        let response = retrieval.retrieve("anything", Some(RetrievalStrategy::Adaptive), 10, None).await;

        // graph tool is missing in both hybrid legs
        let graph_records: Vec<_> = response
            .reasoning_chain
            .iter()
            .filter(|t| t.tool.as_deref() == Some("graph_traversal"))
            .collect();
        assert_eq!(graph_records.len(), 1);
        assert_eq!(graph_records[0].error.as_deref(), Some("tool not configured"));
        assert_eq!(tool_steps(&response).len(), 3);
    }

    #[tokio::test]
    async fn test_max_results_clamped() {
        let vector = FixedTool::new("vector_search", SourceType::Vector, vector_results(&[0.9; 150]));
        let retrieval = orchestrator(ToolSet::new().with_vector(vector.clone()));

        let response = retrieval.retrieve("anything", Some(RetrievalStrategy::VectorOnly), 500, None).await;
        assert_eq!(response.total_results, 100);

        retrieval.retrieve("anything", Some(RetrievalStrategy::VectorOnly), 0, None).await;
        assert_eq!(vector.requested(), vec![100, 10]);
    }

    #[tokio::test]
    async fn test_configured_default_strategy() {
        let config = RetrievalConfig {
            default_strategy: Some("graph_only".to_string()),
            ..RetrievalConfig::default()
        };
        let graph = FixedTool::new("graph_traversal", SourceType::Graph, graph_results(1));
        let retrieval = AdaptiveRetrieval::new(ToolSet::new().with_graph(graph), &config);

        let response = retrieval.retrieve("Who works for Apple Inc.?", None, 10, None).await;
        assert_eq!(response.strategy_used, RetrievalStrategy::GraphOnly);

        let response = retrieval
            .retrieve("Who works for Apple Inc.?", Some(RetrievalStrategy::VectorOnly), 10, None)
            .await;
        assert_eq!(response.strategy_used, RetrievalStrategy::VectorOnly);
    }

    #[tokio::test]
    async fn test_statistics() {
        let vector = FixedTool::new("vector_search", SourceType::Vector, Vec::new());
        let retrieval = orchestrator(ToolSet::new().with_vector(vector));

        let stats = retrieval.statistics();
        assert!(stats.tools_available["vector_search"]);
        assert!(!stats.tools_available["graph_traversal"]);
        assert_eq!(stats.system_status, "degraded");
        assert_eq!(stats.strategies_supported.len(), 5);

        assert_eq!(orchestrator(ToolSet::new()).statistics().system_status, "unavailable");
    }
}

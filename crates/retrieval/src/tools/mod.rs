//! Retrieval tools
//!
//! Three variants behind one capability interface:
//! - [`SimilaritySearchTool`]: nearest-neighbour search over embeddings
//! - [`GraphTraversalTool`]: neighbourhood exploration around mentioned entities
//! - [`LogicalFilterTool`]: exact predicate matching over structured records
//!
//! Every tool bounds its own backend calls with a timeout and reports an
//! unreachable or slow backend as [`AppError::ToolUnavailable`].

pub mod filter;
pub mod graph;
pub mod vector;

pub use filter::LogicalFilterTool;
pub use graph::GraphTraversalTool;
pub use vector::SimilaritySearchTool;

use crate::types::{FilterCondition, RetrievalQuery, RetrievalResult, SourceType};
use agentrag_common::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default per-tool timeout
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Constraints passed alongside the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConstraints {
    /// Predicates for the logical filter tool and vector metadata filtering
    #[serde(default)]
    pub filters: Vec<FilterCondition>,

    /// Traversal depth for the graph tool
    pub max_depth: usize,

    /// Restrict filter results to one record kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Default for SearchConstraints {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            max_depth: 1,
            kind: None,
        }
    }
}

impl SearchConstraints {
    pub fn for_query(query: &RetrievalQuery, max_depth: usize) -> Self {
        Self {
            filters: query.filters.clone().unwrap_or_default(),
            max_depth: max_depth.max(1),
            kind: None,
        }
    }
}

/// Uniform search capability over one backing store
#[async_trait]
pub trait RetrievalTool: Send + Sync {
    /// Stable tool name used in traces and metrics
    fn name(&self) -> &'static str;

    /// One-line description of what the tool is good for
    fn description(&self) -> &'static str;

    fn source_type(&self) -> SourceType;

    /// Results in the tool's own ranking order, at most `top_k`
    async fn search(
        &self,
        query: &RetrievalQuery,
        constraints: &SearchConstraints,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>>;
}

/// The tools available to the orchestrator; any of them may be absent
#[derive(Clone, Default)]
pub struct ToolSet {
    pub vector: Option<Arc<dyn RetrievalTool>>,
    pub graph: Option<Arc<dyn RetrievalTool>>,
    pub filter: Option<Arc<dyn RetrievalTool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, tool: Arc<dyn RetrievalTool>) -> Self {
        self.vector = Some(tool);
        self
    }

    pub fn with_graph(mut self, tool: Arc<dyn RetrievalTool>) -> Self {
        self.graph = Some(tool);
        self
    }

    pub fn with_filter(mut self, tool: Arc<dyn RetrievalTool>) -> Self {
        self.filter = Some(tool);
        self
    }

    pub fn get(&self, source: SourceType) -> Option<&Arc<dyn RetrievalTool>> {
        match source {
            SourceType::Vector => self.vector.as_ref(),
            SourceType::Graph => self.graph.as_ref(),
            SourceType::Filter => self.filter.as_ref(),
        }
    }

    /// Names of configured tools
    pub fn available(&self) -> Vec<&'static str> {
        [&self.vector, &self.graph, &self.filter]
            .into_iter()
            .flatten()
            .map(|tool| tool.name())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_none() && self.graph.is_none() && self.filter.is_none()
    }
}

/// Run a backend call under the tool's timeout
///
/// Backend failures and timeouts become `ToolUnavailable`; filter validation
/// errors are passed through unchanged.
pub(crate) async fn guarded<T, F>(tool: &str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e @ AppError::InvalidFilter { .. })) => Err(e),
        Ok(Err(e @ AppError::ToolUnavailable { .. })) => Err(e),
        Ok(Err(e)) => Err(AppError::tool_unavailable(tool, e.to_string())),
        Err(_) => Err(AppError::tool_unavailable(
            tool,
            format!("no response within {}ms", timeout.as_millis()),
        )),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by the tool and orchestrator tests

    use super::*;
    use crate::types::Metadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn result(id: &str, content: &str, score: f32, source_type: SourceType) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            content: content.to_string(),
            score,
            source_type,
            metadata: Metadata::new(),
            reasoning: None,
        }
    }

    /// Returns canned results and records each requested `top_k`
    pub struct FixedTool {
        pub name: &'static str,
        pub source: SourceType,
        pub results: Vec<RetrievalResult>,
        pub calls: AtomicUsize,
        pub requested: std::sync::Mutex<Vec<usize>>,
    }

    impl FixedTool {
        pub fn new(name: &'static str, source: SourceType, results: Vec<RetrievalResult>) -> Arc<Self> {
            Arc::new(Self {
                name,
                source,
                results,
                calls: AtomicUsize::new(0),
                requested: std::sync::Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requested(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RetrievalTool for FixedTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "canned results"
        }

        fn source_type(&self) -> SourceType {
            self.source
        }

        async fn search(
            &self,
            _query: &RetrievalQuery,
            _constraints: &SearchConstraints,
            top_k: usize,
        ) -> Result<Vec<RetrievalResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(top_k);
            Ok(self.results.iter().take(top_k).cloned().collect())
        }
    }

    /// Always unreachable
    pub struct FailingTool {
        pub name: &'static str,
        pub source: SourceType,
    }

    #[async_trait]
    impl RetrievalTool for FailingTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "unreachable backend"
        }

        fn source_type(&self) -> SourceType {
            self.source
        }

        async fn search(
            &self,
            _query: &RetrievalQuery,
            _constraints: &SearchConstraints,
            _top_k: usize,
        ) -> Result<Vec<RetrievalResult>> {
            Err(AppError::tool_unavailable(self.name, "connection refused"))
        }
    }
}

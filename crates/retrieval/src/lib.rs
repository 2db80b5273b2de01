//! AgentRAG Retrieval
//!
//! Turns a free-text query into ranked, scored results:
//! - [`analyzer`]: intent, entities, query type and complexity
//! - [`strategy`]: rule-based strategy selection
//! - [`tools`]: similarity search, graph traversal and logical filter tools
//! - [`backends`]: vector index, graph store and record store adapters
//! - [`orchestrator`]: strategy execution, fusion and confidence scoring

pub mod analyzer;
pub mod backends;
pub mod fusion;
pub mod orchestrator;
pub mod predicate;
pub mod strategy;
pub mod tools;
pub mod types;

pub use analyzer::QueryAnalyzer;
pub use orchestrator::{AdaptiveRetrieval, RetrievalStatistics};
pub use predicate::Predicate;
pub use strategy::StrategySelector;
pub use tools::{RetrievalTool, SearchConstraints, ToolSet};
pub use types::{
    FilterCondition, FilterOperator, Metadata, QueryIntent, QueryType, RetrievalContext,
    RetrievalQuery, RetrievalResponse, RetrievalResult, RetrievalStrategy, SourceType,
    TraceRecord,
};

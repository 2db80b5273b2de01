//! Retrieval data model
//!
//! Queries, filter conditions, results and the structured trace that every
//! strategy appends to.

use agentrag_common::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form attributes carried by results and backing-store records
pub type Metadata = serde_json::Map<String, Value>;

/// Primary intent of a query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    EntityLookup,
    RelationshipExploration,
    FilteredSearch,
    GeneralSearch,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::EntityLookup => "entity_lookup",
            QueryIntent::RelationshipExploration => "relationship_exploration",
            QueryIntent::FilteredSearch => "filtered_search",
            QueryIntent::GeneralSearch => "general_search",
        }
    }
}

/// Shape of the answer the query is after
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// "similar to", "like"
    Similarity,
    /// "path", "connect"
    PathFinding,
    /// "all", "list"
    Comprehensive,
    Targeted,
}

/// Comparison applied by a filter condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    In,
    NotIn,
}

impl FilterOperator {
    fn is_ordering(&self) -> bool {
        matches!(
            self,
            FilterOperator::Gt | FilterOperator::Lt | FilterOperator::Gte | FilterOperator::Lte
        )
    }
}

/// A single predicate over a structured attribute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl FilterCondition {
    /// Build a validated condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Result<Self> {
        let condition = Self {
            field: field.into(),
            operator,
            value: value.into(),
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Equality conditions for every metadata entry
    pub fn from_metadata(metadata: &Metadata) -> Vec<Self> {
        metadata
            .iter()
            .map(|(field, value)| Self {
                field: field.clone(),
                operator: FilterOperator::Eq,
                value: value.clone(),
            })
            .collect()
    }

    /// Check operator/value compatibility
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| AppError::InvalidFilter {
            field: self.field.clone(),
            message: message.to_string(),
        };

        if self.field.trim().is_empty() {
            return Err(invalid("field name is empty"));
        }

        match self.operator {
            FilterOperator::In | FilterOperator::NotIn if !self.value.is_array() => {
                Err(invalid("in/not_in require a set-valued (array) value"))
            }
            op if op.is_ordering() && !(self.value.is_number() || self.value.is_string()) => {
                Err(invalid("ordering operators require a number or string value"))
            }
            FilterOperator::Contains if self.value.is_null() => {
                Err(invalid("contains requires a non-null value"))
            }
            _ => Ok(()),
        }
    }
}

/// Retrieval modality that produced a result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Vector,
    Graph,
    Filter,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Vector => "vector",
            SourceType::Graph => "graph",
            SourceType::Filter => "filter",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub id: String,
    pub content: String,
    /// Relevance in [0, 1], higher is better
    pub score: f32,
    pub source_type: SourceType,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl RetrievalResult {
    /// Identity used for deduplication across tools
    pub fn dedup_key(&self) -> String {
        self.content.trim().to_lowercase()
    }
}

/// Caller-supplied context for a retrieval request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// Prior user turns, oldest first
    #[serde(default)]
    pub history: Vec<String>,

    /// Structured constraints for the logical filter tool
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
}

/// A classified query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub id: Uuid,
    pub text: String,
    pub intent: QueryIntent,
    pub entities_mentioned: Vec<String>,
    pub query_type: QueryType,
    /// Always within [0, 1]
    pub complexity_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterCondition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RetrievalContext>,
}

impl RetrievalQuery {
    /// Query used when analysis fails: general search, zero complexity
    pub fn fallback(text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            intent: QueryIntent::GeneralSearch,
            entities_mentioned: Vec::new(),
            query_type: QueryType::Targeted,
            complexity_score: 0.0,
            filters: None,
            context: None,
        }
    }
}

/// Retrieval strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    VectorOnly,
    GraphOnly,
    #[serde(alias = "logical_filter")]
    FilterOnly,
    Hybrid,
    Adaptive,
}

impl RetrievalStrategy {
    pub const ALL: [RetrievalStrategy; 5] = [
        RetrievalStrategy::VectorOnly,
        RetrievalStrategy::GraphOnly,
        RetrievalStrategy::FilterOnly,
        RetrievalStrategy::Hybrid,
        RetrievalStrategy::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::VectorOnly => "vector_only",
            RetrievalStrategy::GraphOnly => "graph_only",
            RetrievalStrategy::FilterOnly => "filter_only",
            RetrievalStrategy::Hybrid => "hybrid",
            RetrievalStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "vector_only" | "vector" => Ok(RetrievalStrategy::VectorOnly),
            "graph_only" | "graph" => Ok(RetrievalStrategy::GraphOnly),
            "filter_only" | "logical_filter" | "filter" => Ok(RetrievalStrategy::FilterOnly),
            "hybrid" => Ok(RetrievalStrategy::Hybrid),
            "adaptive" => Ok(RetrievalStrategy::Adaptive),
            other => Err(AppError::Validation {
                message: format!("unknown retrieval strategy: {}", other),
                field: Some("strategy".to_string()),
            }),
        }
    }
}

/// One entry of the retrieval trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TraceRecord {
    /// A decision or bookkeeping step
    pub fn step(step: impl Into<String>, parameters: Value) -> Self {
        Self {
            step: step.into(),
            tool: None,
            parameters,
            result_count: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A tool invocation
    pub fn tool_call(
        step: impl Into<String>,
        tool: &str,
        parameters: Value,
        outcome: std::result::Result<usize, String>,
    ) -> Self {
        let (result_count, error) = match outcome {
            Ok(count) => (Some(count), None),
            Err(error) => (Some(0), Some(error)),
        };

        Self {
            step: step.into(),
            tool: Some(tool.to_string()),
            parameters,
            result_count,
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Complete retrieval response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub query_id: Uuid,
    pub strategy_used: RetrievalStrategy,
    /// Ranked by descending score
    pub results: Vec<RetrievalResult>,
    pub reasoning_chain: Vec<TraceRecord>,
    pub total_results: usize,
    pub processing_time_ms: f64,
    /// Always within [0, 1]
    pub confidence_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_requires_array() {
        let err = FilterCondition::new("sector", FilterOperator::In, "tech").unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter { .. }));

        let ok = FilterCondition::new("sector", FilterOperator::NotIn, json!(["tech", "retail"]));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_ordering_requires_scalar() {
        assert!(FilterCondition::new("founded", FilterOperator::Gte, 1976).is_ok());
        assert!(FilterCondition::new("founded", FilterOperator::Gt, json!([1976])).is_err());
    }

    #[test]
    fn test_from_metadata_builds_equality() {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), json!("company"));
        let conditions = FilterCondition::from_metadata(&metadata);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].operator, FilterOperator::Eq);
    }

    #[test]
    fn test_strategy_parsing_and_serde() {
        assert_eq!("logical_filter".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::FilterOnly);
        assert_eq!("Hybrid".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::Hybrid);
        assert!("random".parse::<RetrievalStrategy>().is_err());

        let json = serde_json::to_string(&RetrievalStrategy::VectorOnly).unwrap();
        assert_eq!(json, "\"vector_only\"");
        let parsed: RetrievalStrategy = serde_json::from_str("\"logical_filter\"").unwrap();
        assert_eq!(parsed, RetrievalStrategy::FilterOnly);
    }

    #[test]
    fn test_dedup_key_normalizes_content() {
        let result = RetrievalResult {
            id: "a".into(),
            content: "  Steve Jobs FOUNDED Apple Inc. ".into(),
            score: 0.9,
            source_type: SourceType::Vector,
            metadata: Metadata::new(),
            reasoning: None,
        };
        assert_eq!(result.dedup_key(), "steve jobs founded apple inc.");
    }

    #[test]
    fn test_fallback_query() {
        let query = RetrievalQuery::fallback("");
        assert_eq!(query.intent, QueryIntent::GeneralSearch);
        assert_eq!(query.complexity_score, 0.0);
    }
}

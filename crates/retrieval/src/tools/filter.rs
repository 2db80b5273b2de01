//! Logical filter tool

use super::{guarded, RetrievalTool, SearchConstraints, DEFAULT_TOOL_TIMEOUT};
use crate::backends::{Record, RecordStore};
use crate::predicate::Predicate;
use crate::types::{FilterCondition, Metadata, RetrievalQuery, RetrievalResult, SourceType};
use agentrag_common::errors::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const TOOL_NAME: &str = "logical_filter";

/// Exact matches carry full relevance
const MATCH_SCORE: f32 = 1.0;

/// Matches structured records against filter conditions
pub struct LogicalFilterTool {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl LogicalFilterTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Records whose attributes equal every metadata entry
    pub async fn filter_by_metadata(&self, metadata: &Metadata, limit: usize) -> Result<Vec<RetrievalResult>> {
        self.select(FilterCondition::from_metadata(metadata), None, limit).await
    }

    /// Records of one kind, optionally narrowed by further conditions
    pub async fn filter_by_type(
        &self,
        kind: &str,
        conditions: Vec<FilterCondition>,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        self.select(conditions, Some(kind), limit).await
    }

    async fn select(&self, conditions: Vec<FilterCondition>, kind: Option<&str>, limit: usize) -> Result<Vec<RetrievalResult>> {
        let predicate = Predicate::new(conditions)?;
        let condition_count = predicate.conditions().len();

        let records = guarded(TOOL_NAME, self.timeout, self.store.select(&predicate, kind, limit)).await?;

        Ok(records
            .into_iter()
            .take(limit)
            .map(|record| to_result(record, condition_count))
            .collect())
    }
}

fn to_result(record: Record, condition_count: usize) -> RetrievalResult {
    let mut metadata = record.attributes;
    metadata.insert("kind".to_string(), json!(record.kind));

    RetrievalResult {
        id: record.id,
        content: record.content,
        score: MATCH_SCORE,
        source_type: SourceType::Filter,
        metadata,
        reasoning: Some(match condition_count {
            0 => "Unconstrained match".to_string(),
            1 => "Matched 1 filter condition".to_string(),
            n => format!("Matched all {} filter conditions", n),
        }),
    }
}

#[async_trait]
impl RetrievalTool for LogicalFilterTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Exact, range and set predicates over structured attributes. Best for constrained queries."
    }

    fn source_type(&self) -> SourceType {
        SourceType::Filter
    }

    #[instrument(skip(self, query, constraints), fields(query_id = %query.id, filters = constraints.filters.len()))]
    async fn search(
        &self,
        query: &RetrievalQuery,
        constraints: &SearchConstraints,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let results = self
            .select(constraints.filters.clone(), constraints.kind.as_deref(), top_k)
            .await?;

        debug!(results = results.len(), "Logical filter completed");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QueryAnalyzer;
    use crate::backends::InMemoryRecordStore;
    use crate::types::FilterOperator;
    use agentrag_common::errors::AppError;

    async fn sample_store() -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        for (id, kind, content, founded, sector) in [
            ("apple", "company", "Apple Inc. designs consumer electronics.", 1976, "technology"),
            ("next", "company", "NeXT built workstations.", 1985, "technology"),
            ("dole", "company", "Dole grows bananas.", 1851, "food"),
        ] {
            let mut attributes = Metadata::new();
            attributes.insert("founded".into(), json!(founded));
            attributes.insert("sector".into(), json!(sector));
            store
                .insert(Record {
                    id: id.into(),
                    kind: kind.into(),
                    content: content.into(),
                    attributes,
                })
                .await;
        }
        store
            .insert(Record {
                id: "jobs".into(),
                kind: "person".into(),
                content: "Steve Jobs".into(),
                attributes: Metadata::new(),
            })
            .await;
        store
    }

    #[tokio::test]
    async fn test_conditions_are_conjunctive() {
        let tool = LogicalFilterTool::new(sample_store().await);
        let query = QueryAnalyzer::default().analyze("technology companies founded after 1980", None);
        let constraints = SearchConstraints {
            filters: vec![
                FilterCondition::new("sector", FilterOperator::Eq, "technology").unwrap(),
                FilterCondition::new("founded", FilterOperator::Gt, 1980).unwrap(),
            ],
            ..SearchConstraints::default()
        };

        let results = tool.search(&query, &constraints, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "next");
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[0].source_type, SourceType::Filter);
        assert_eq!(results[0].metadata["kind"], json!("company"));
    }

    #[tokio::test]
    async fn test_invalid_filter_rejected() {
        let tool = LogicalFilterTool::new(sample_store().await);
        let query = QueryAnalyzer::default().analyze("only these sectors", None);
        let constraints = SearchConstraints {
            filters: vec![FilterCondition {
                field: "sector".into(),
                operator: FilterOperator::In,
                value: json!("technology"),
            }],
            ..SearchConstraints::default()
        };

        let err = tool.search(&query, &constraints, 10).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter { .. }));
    }

    #[tokio::test]
    async fn test_metadata_and_type_helpers() {
        let tool = LogicalFilterTool::new(sample_store().await);

        let mut metadata = Metadata::new();
        metadata.insert("sector".into(), json!("food"));
        let food = tool.filter_by_metadata(&metadata, 10).await.unwrap();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].id, "dole");

        let people = tool.filter_by_type("person", Vec::new(), 10).await.unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].content, "Steve Jobs");

        let old = tool
            .filter_by_type(
                "company",
                vec![FilterCondition::new("founded", FilterOperator::Lte, 1976).unwrap()],
                1,
            )
            .await
            .unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].id, "apple");
    }
}

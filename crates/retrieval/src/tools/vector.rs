//! Similarity search tool

use super::{guarded, RetrievalTool, SearchConstraints, DEFAULT_TOOL_TIMEOUT};
use crate::backends::VectorIndex;
use crate::predicate::Predicate;
use crate::types::{RetrievalQuery, RetrievalResult, SourceType};
use agentrag_common::embeddings::Embedder;
use agentrag_common::errors::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const TOOL_NAME: &str = "vector_search";

/// Embeds the query and searches a nearest-neighbour index
pub struct SimilaritySearchTool {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
}

impl SimilaritySearchTool {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RetrievalTool for SimilaritySearchTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Semantic similarity search over document embeddings. Best for factual lookups and paraphrased questions."
    }

    fn source_type(&self) -> SourceType {
        SourceType::Vector
    }

    #[instrument(skip(self, query, constraints), fields(query_id = %query.id))]
    async fn search(
        &self,
        query: &RetrievalQuery,
        constraints: &SearchConstraints,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let predicate = if constraints.filters.is_empty() {
            None
        } else {
            Some(Predicate::new(constraints.filters.clone())?)
        };

        let hits = guarded(TOOL_NAME, self.timeout, async {
            let embedding = self.embedder.embed(&query.text).await?;
            self.index.query(&embedding, top_k, predicate.as_ref()).await
        })
        .await?;

        let results: Vec<RetrievalResult> = hits
            .into_iter()
            .take(top_k)
            .map(|hit| {
                let score = (1.0 - hit.distance).clamp(0.0, 1.0);
                let mut metadata = hit.metadata;
                metadata.insert("distance".to_string(), json!(hit.distance));

                RetrievalResult {
                    id: hit.id,
                    content: hit.document,
                    score,
                    source_type: SourceType::Vector,
                    metadata,
                    reasoning: Some(format!("Semantic similarity {:.2} to the query", score)),
                }
            })
            .collect();

        debug!(results = results.len(), "Vector search completed");
        Ok(results)
    }
}

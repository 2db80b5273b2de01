//! Graph traversal tool

use super::{guarded, RetrievalTool, SearchConstraints, DEFAULT_TOOL_TIMEOUT};
use crate::backends::{GraphHop, GraphNode, GraphStore};
use crate::types::{Metadata, RetrievalQuery, RetrievalResult, SourceType};
use agentrag_common::errors::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const TOOL_NAME: &str = "graph_traversal";

/// Nodes resolved per mentioned entity
const NODES_PER_ENTITY: usize = 5;

/// Score of an edge without a weight property
const DEFAULT_EDGE_SCORE: f32 = 0.5;

/// Explores relationships around the entities a query mentions
pub struct GraphTraversalTool {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
}

impl GraphTraversalTool {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Entities related to a node, optionally through given relationship types only
    pub async fn find_related(
        &self,
        node_id: &str,
        relationships: &[String],
        max_depth: usize,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let hops = guarded(
            TOOL_NAME,
            self.timeout,
            self.store.neighborhood(node_id, max_depth.max(1), relationships, limit),
        )
        .await?;

        let centre = label_of(&hops, node_id);
        Ok(hops.iter().map(|hop| render(hop, centre)).collect())
    }

    /// Shortest connection between two nodes as an ordered list of triples
    pub async fn find_path(&self, source_id: &str, target_id: &str, max_depth: usize) -> Result<Option<Vec<RetrievalResult>>> {
        let path = guarded(
            TOOL_NAME,
            self.timeout,
            self.store.shortest_path(source_id, target_id, max_depth),
        )
        .await?;

        Ok(path.map(|hops| {
            let centre = label_of(&hops, source_id);
            hops.iter().map(|hop| render(hop, centre)).collect()
        }))
    }

    /// Resolve names to nodes, then collect their neighbourhoods within `budget`
    async fn explore(
        &self,
        name: &str,
        depth: usize,
        budget: usize,
        seen: &mut HashSet<String>,
        results: &mut Vec<RetrievalResult>,
    ) -> Result<()> {
        let nodes: Vec<GraphNode> = self.store.find_nodes(name, NODES_PER_ENTITY).await?;
        let mut taken = 0;

        for node in nodes {
            if taken >= budget {
                break;
            }
            // edges already taken by an earlier entity still count against the limit
            let wanted = budget - taken + seen.len();
            let hops = self.store.neighborhood(&node.id, depth, &[], wanted).await?;
            for hop in hops {
                if taken >= budget {
                    break;
                }
                if seen.insert(hop.edge.id.clone()) {
                    results.push(render(&hop, &node.label));
                    taken += 1;
                }
            }
        }

        Ok(())
    }
}

/// Label of `node_id` as it appears on any hop, else the id itself
fn label_of<'a>(hops: &'a [GraphHop], node_id: &'a str) -> &'a str {
    hops.iter()
        .find_map(|hop| {
            [&hop.subject, &hop.object]
                .into_iter()
                .find(|node| node.id == node_id)
                .map(|node| node.label.as_str())
        })
        .unwrap_or(node_id)
}

/// Render a hop as a "subject predicate object" result seen from the traversal centre
///
/// The connected entity is the endpoint the traversal reached, which for a
/// multi-hop edge is not the centre's direct neighbour.
fn render(hop: &GraphHop, centre: &str) -> RetrievalResult {
    let connected = hop.reached();
    let predicate = hop.edge.relationship.to_lowercase().replace('_', " ");
    let score = hop.edge.weight().unwrap_or(DEFAULT_EDGE_SCORE).clamp(0.0, 1.0);

    let mut metadata = Metadata::new();
    metadata.insert("center_entity".into(), json!(centre));
    metadata.insert("connected_entity".into(), json!(connected.label));
    metadata.insert("relationship".into(), json!(hop.edge.relationship));
    metadata.insert("hops".into(), json!(hop.hops));
    metadata.insert("properties".into(), Value::Object(hop.edge.properties.clone()));

    RetrievalResult {
        id: hop.edge.id.clone(),
        content: format!("{} {} {}", hop.subject.label, predicate, hop.object.label),
        score,
        source_type: SourceType::Graph,
        metadata,
        reasoning: Some(format!(
            "{}-hop {} relationship from {}",
            hop.hops, hop.edge.relationship, centre
        )),
    }
}

#[async_trait]
impl RetrievalTool for GraphTraversalTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Traverses knowledge graph relationships to find connected entities. Best for relationship and multi-hop questions."
    }

    fn source_type(&self) -> SourceType {
        SourceType::Graph
    }

    #[instrument(skip(self, query, constraints), fields(query_id = %query.id, depth = constraints.max_depth))]
    async fn search(
        &self,
        query: &RetrievalQuery,
        constraints: &SearchConstraints,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let depth = constraints.max_depth.max(1);
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        guarded(TOOL_NAME, self.timeout, async {
            if query.entities_mentioned.is_empty() {
                self.explore(&query.text, depth, top_k, &mut seen, &mut results).await
            } else {
                let per_entity = (top_k / query.entities_mentioned.len()).max(1);
                for entity in &query.entities_mentioned {
                    self.explore(entity, depth, per_entity, &mut seen, &mut results).await?;
                }
                Ok(())
            }
        })
        .await?;

        results.truncate(top_k);
        debug!(results = results.len(), "Graph traversal completed");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QueryAnalyzer;
    use crate::backends::InMemoryGraphStore;
    use agentrag_common::errors::AppError;

    async fn sample_store() -> Arc<InMemoryGraphStore> {
        let store = Arc::new(InMemoryGraphStore::new());
        store.add_node("apple", "Apple Inc", "company", Metadata::new()).await;
        store.add_node("jobs", "Steve Jobs", "person", Metadata::new()).await;
        store.add_node("wozniak", "Steve Wozniak", "person", Metadata::new()).await;
        store.add_node("next", "NeXT", "company", Metadata::new()).await;

        let mut weighted = Metadata::new();
        weighted.insert("weight".into(), json!(0.9));
        weighted.insert("since".into(), json!(1976));

        store.add_edge("e1", "jobs", "CO_FOUNDED", "apple", weighted).await;
        store.add_edge("e2", "wozniak", "CO_FOUNDED", "apple", Metadata::new()).await;
        store.add_edge("e3", "jobs", "FOUNDED", "next", Metadata::new()).await;
        store
    }

    #[tokio::test]
    async fn test_entity_neighbourhood_results() {
        let tool = GraphTraversalTool::new(sample_store().await);
        let query = QueryAnalyzer::default().analyze("Who founded Apple Inc?", None);
        assert_eq!(query.entities_mentioned, vec!["Apple Inc"]);

        let results = tool.search(&query, &SearchConstraints::default(), 10).await.unwrap();
        assert_eq!(results.len(), 2);

        let first = &results[0];
        assert_eq!(first.content, "Steve Jobs co founded Apple Inc");
        assert_eq!(first.score, 0.9);
        assert_eq!(first.metadata["center_entity"], json!("Apple Inc"));
        assert_eq!(first.metadata["connected_entity"], json!("Steve Jobs"));
        assert_eq!(first.metadata["hops"], json!(1));
        assert_eq!(first.metadata["properties"]["since"], json!(1976));

        assert_eq!(results[1].score, DEFAULT_EDGE_SCORE);
    }

    #[tokio::test]
    async fn test_budget_split_and_edge_dedup() {
        let tool = GraphTraversalTool::new(sample_store().await);
        let query = QueryAnalyzer::default().analyze("How is Apple Inc tied to Steve Jobs", None);
        assert_eq!(query.entities_mentioned.len(), 2);

        let results = tool.search(&query, &SearchConstraints::default(), 4).await.unwrap();
        let mut ids: Vec<_> = results.iter().map(|r| r.id.clone()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_shared_edges_do_not_shrink_the_next_budget() {
        let store = sample_store().await;
        store.add_node("pixar", "Pixar", "company", Metadata::new()).await;
        store.add_edge("e5", "jobs", "CEO_OF", "pixar", Metadata::new()).await;
        let tool = GraphTraversalTool::new(store);

        let query = QueryAnalyzer::default().analyze("How is Apple Inc tied to Steve Jobs", None);
        let results = tool.search(&query, &SearchConstraints::default(), 4).await.unwrap();

        let mut ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["e1", "e2", "e3", "e5"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_query_text() {
        let tool = GraphTraversalTool::new(sample_store().await);
        let query = QueryAnalyzer::default().analyze("companies started by next founders", None);
        assert!(query.entities_mentioned.is_empty());

        let results = tool.search(&query, &SearchConstraints::default(), 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "e3");
    }

    #[tokio::test]
    async fn test_deeper_traversal_reports_hops() {
        let tool = GraphTraversalTool::new(sample_store().await);
        let query = QueryAnalyzer::default().analyze("What is NeXT", None);
        let constraints = SearchConstraints {
            max_depth: 2,
            ..SearchConstraints::default()
        };

        let results = tool.search(&query, &constraints, 10).await.unwrap();
        let far = results.iter().find(|r| r.id == "e1").unwrap();
        assert_eq!(far.metadata["hops"], json!(2));
        assert_eq!(far.metadata["center_entity"], json!("NeXT"));
        assert_eq!(far.metadata["connected_entity"], json!("Apple Inc"));
        assert_eq!(far.reasoning.as_deref(), Some("2-hop CO_FOUNDED relationship from NeXT"));

        let near = results.iter().find(|r| r.id == "e3").unwrap();
        assert_eq!(near.metadata["connected_entity"], json!("Steve Jobs"));
    }

    #[tokio::test]
    async fn test_related_and_path() {
        let tool = GraphTraversalTool::new(sample_store().await);

        let related = tool.find_related("jobs", &["FOUNDED".to_string()], 1, 10).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].content, "Steve Jobs founded NeXT");
        assert_eq!(related[0].metadata["center_entity"], json!("Steve Jobs"));
        assert_eq!(related[0].metadata["connected_entity"], json!("NeXT"));

        let path = tool.find_path("wozniak", "next", 4).await.unwrap().unwrap();
        let ids: Vec<_> = path.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1", "e3"]);
        assert!(path.iter().all(|r| r.metadata["center_entity"] == json!("Steve Wozniak")));
        assert_eq!(path[2].metadata["connected_entity"], json!("NeXT"));
    }

    struct DownStore;

    #[async_trait]
    impl GraphStore for DownStore {
        async fn find_nodes(&self, _text: &str, _limit: usize) -> Result<Vec<GraphNode>> {
            Err(AppError::DatabaseConnection {
                message: "graph database unreachable".to_string(),
            })
        }

        async fn neighborhood(&self, _: &str, _: usize, _: &[String], _: usize) -> Result<Vec<GraphHop>> {
            Ok(Vec::new())
        }

        async fn shortest_path(&self, _: &str, _: &str, _: usize) -> Result<Option<Vec<GraphHop>>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let tool = GraphTraversalTool::new(Arc::new(DownStore));
        let query = QueryAnalyzer::default().analyze("Apple", None);
        let err = tool.search(&query, &SearchConstraints::default(), 5).await.unwrap_err();
        assert!(matches!(err, AppError::ToolUnavailable { .. }));
    }
}

//! In-process backing stores
//!
//! Used for tests, demos and small corpora that fit in memory.

use super::{GraphEdge, GraphHop, GraphNode, GraphStore, Record, RecordStore, VectorHit, VectorIndex};
use crate::predicate::Predicate;
use crate::types::Metadata;
use agentrag_common::errors::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    document: String,
    embedding: Vec<f32>,
    metadata: Metadata,
}

/// Brute-force cosine index
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document
    pub async fn insert(&self, id: impl Into<String>, document: impl Into<String>, embedding: Vec<f32>, metadata: Metadata) {
        let id = id.into();
        let mut documents = self.documents.write().await;
        documents.retain(|d| d.id != id);
        documents.push(StoredDocument {
            id,
            document: document.into(),
            embedding,
            metadata,
        });
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    Some(1.0 - dot / (norm_a * norm_b))
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn query(&self, embedding: &[f32], top_k: usize, filters: Option<&Predicate>) -> Result<Vec<VectorHit>> {
        let documents = self.documents.read().await;

        let mut hits: Vec<VectorHit> = documents
            .iter()
            .filter(|d| filters.map(|p| p.matches(&d.metadata)).unwrap_or(true))
            .filter_map(|d| {
                cosine_distance(embedding, &d.embedding).map(|distance| VectorHit {
                    id: d.id.clone(),
                    distance,
                    metadata: d.metadata.clone(),
                    document: d.document.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[derive(Debug, Default)]
struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl Graph {
    fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn hop(&self, edge: &GraphEdge, hops: usize, from_id: &str) -> Option<GraphHop> {
        Some(GraphHop {
            edge: edge.clone(),
            subject: self.node(&edge.source_id)?.clone(),
            object: self.node(&edge.target_id)?.clone(),
            hops,
            from_id: from_id.to_string(),
        })
    }

    /// Edges touching `node_id` paired with the opposite endpoint
    fn incident<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = (&'a GraphEdge, &'a str)> + 'a {
        self.edges.iter().filter_map(move |e| {
            if e.source_id == node_id {
                Some((e, e.target_id.as_str()))
            } else if e.target_id == node_id {
                Some((e, e.source_id.as_str()))
            } else {
                None
            }
        })
    }
}

/// Adjacency-list property graph
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graph: RwLock<Graph>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_node(&self, id: impl Into<String>, label: impl Into<String>, kind: impl Into<String>, properties: Metadata) {
        let node = GraphNode {
            id: id.into(),
            label: label.into(),
            kind: kind.into(),
            properties,
        };
        let mut graph = self.graph.write().await;
        graph.nodes.retain(|n| n.id != node.id);
        graph.nodes.push(node);
    }

    pub async fn add_edge(
        &self,
        id: impl Into<String>,
        source_id: impl Into<String>,
        relationship: impl Into<String>,
        target_id: impl Into<String>,
        properties: Metadata,
    ) {
        let edge = GraphEdge {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship: relationship.into(),
            properties,
        };
        let mut graph = self.graph.write().await;
        graph.edges.retain(|e| e.id != edge.id);
        graph.edges.push(edge);
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find_nodes(&self, text: &str, limit: usize) -> Result<Vec<GraphNode>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let graph = self.graph.read().await;
        Ok(graph
            .nodes
            .iter()
            .filter(|n| {
                let label = n.label.trim().to_lowercase();
                !label.is_empty() && (label.contains(&needle) || needle.contains(&label))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn neighborhood(
        &self,
        node_id: &str,
        depth: usize,
        relationships: &[String],
        limit: usize,
    ) -> Result<Vec<GraphHop>> {
        let graph = self.graph.read().await;
        let admits = |edge: &GraphEdge| {
            relationships.is_empty()
                || relationships.iter().any(|r| r.eq_ignore_ascii_case(&edge.relationship))
        };

        let mut visited: HashSet<String> = HashSet::from([node_id.to_string()]);
        let mut emitted: HashSet<String> = HashSet::new();
        let mut frontier = vec![node_id.to_string()];
        let mut hops = Vec::new();

        for level in 1..=depth {
            let mut next = Vec::new();
            for current in &frontier {
                for (edge, other) in graph.incident(current) {
                    if !admits(edge) || !emitted.insert(edge.id.clone()) {
                        continue;
                    }
                    if let Some(hop) = graph.hop(edge, level, current) {
                        hops.push(hop);
                        if hops.len() >= limit {
                            return Ok(hops);
                        }
                    }
                    if visited.insert(other.to_string()) {
                        next.push(other.to_string());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(hops)
    }

    async fn shortest_path(&self, source_id: &str, target_id: &str, max_depth: usize) -> Result<Option<Vec<GraphHop>>> {
        let graph = self.graph.read().await;
        if graph.node(source_id).is_none() || graph.node(target_id).is_none() {
            return Ok(None);
        }
        if source_id == target_id {
            return Ok(Some(Vec::new()));
        }

        // node id -> (previous node id, edge used to reach it)
        let mut parents: HashMap<String, (String, GraphEdge)> = HashMap::new();
        let mut queue = VecDeque::from([(source_id.to_string(), 0usize)]);
        let mut visited: HashSet<String> = HashSet::from([source_id.to_string()]);

        while let Some((current, distance)) = queue.pop_front() {
            if current == target_id {
                break;
            }
            if distance >= max_depth {
                continue;
            }
            for (edge, other) in graph.incident(&current) {
                if visited.insert(other.to_string()) {
                    parents.insert(other.to_string(), (current.clone(), edge.clone()));
                    queue.push_back((other.to_string(), distance + 1));
                }
            }
        }

        if !parents.contains_key(target_id) {
            return Ok(None);
        }

        let mut steps = Vec::new();
        let mut cursor = target_id.to_string();
        while let Some((previous, edge)) = parents.get(&cursor) {
            steps.push((previous, edge));
            cursor = previous.clone();
        }
        steps.reverse();

        Ok(Some(
            steps
                .into_iter()
                .enumerate()
                .filter_map(|(i, (previous, edge))| graph.hop(edge, i + 1, previous))
                .collect(),
        ))
    }
}

/// Vector of records evaluated with [`Predicate::matches`]
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: Record) {
        let mut records = self.records.write().await;
        records.retain(|r| r.id != record.id);
        records.push(record);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select(&self, predicate: &Predicate, kind: Option<&str>, limit: usize) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| kind.map(|k| r.kind.eq_ignore_ascii_case(k)).unwrap_or(true))
            .filter(|r| predicate.matches(&r.attributes))
            .take(limit)
            .cloned()
            .collect())
    }
}

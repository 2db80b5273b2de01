//! Backing-store interfaces consumed by the retrieval tools
//!
//! - [`VectorIndex`]: nearest-neighbour lookup over document embeddings
//! - [`GraphStore`]: name lookup and bounded-depth traversal over a labeled graph
//! - [`RecordStore`]: predicate selection over structured records

pub mod memory;
pub mod postgres;

use crate::predicate::Predicate;
use crate::types::Metadata;
use agentrag_common::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::{InMemoryGraphStore, InMemoryRecordStore, InMemoryVectorIndex};
pub use postgres::{PgGraphStore, PgRecordStore, PgVectorIndex};

/// One nearest-neighbour match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    /// Cosine distance, 0 is identical
    pub distance: f32,
    pub metadata: Metadata,
    pub document: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours in ascending distance order
    async fn query(&self, embedding: &[f32], top_k: usize, filters: Option<&Predicate>) -> Result<Vec<VectorHit>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    /// Node type, e.g. "company" or "person"
    pub kind: String,
    #[serde(default)]
    pub properties: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relationship: String,
    #[serde(default)]
    pub properties: Metadata,
}

impl GraphEdge {
    /// Edge weight property, if present and numeric
    pub fn weight(&self) -> Option<f32> {
        self.properties
            .get("weight")
            .and_then(|w| w.as_f64())
            .map(|w| w as f32)
    }
}

/// An edge reached during traversal, with both endpoints resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphHop {
    pub edge: GraphEdge,
    pub subject: GraphNode,
    pub object: GraphNode,
    /// Distance from the traversal centre, starting at 1
    pub hops: usize,
    /// Endpoint the traversal reached this edge from
    pub from_id: String,
}

impl GraphHop {
    /// The endpoint on the far side of `from_id`
    pub fn reached(&self) -> &GraphNode {
        if self.subject.id == self.from_id {
            &self.object
        } else {
            &self.subject
        }
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Nodes whose label contains `text` or is contained in it, case-insensitive
    async fn find_nodes(&self, text: &str, limit: usize) -> Result<Vec<GraphNode>>;

    /// Edges within `depth` hops of `node_id`, nearest first
    ///
    /// An empty `relationships` slice admits every relationship type.
    async fn neighborhood(
        &self,
        node_id: &str,
        depth: usize,
        relationships: &[String],
        limit: usize,
    ) -> Result<Vec<GraphHop>>;

    /// Shortest undirected path between two nodes, if one exists within `max_depth`
    async fn shortest_path(&self, source_id: &str, target_id: &str, max_depth: usize) -> Result<Option<Vec<GraphHop>>>;
}

/// A structured record addressed by the logical filter tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub attributes: Metadata,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records matching the predicate, optionally restricted to one kind
    async fn select(&self, predicate: &Predicate, kind: Option<&str>, limit: usize) -> Result<Vec<Record>>;
}

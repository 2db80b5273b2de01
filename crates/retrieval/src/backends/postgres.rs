//! Postgres-backed stores
//!
//! Raw statements through sea-orm. Embeddings are passed in pgvector's text
//! form (`[1.0,2.0,...]`) and cast with `::vector`.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE documents (
//!     id TEXT PRIMARY KEY,
//!     content TEXT NOT NULL,
//!     metadata JSONB NOT NULL DEFAULT '{}',
//!     embedding vector
//! );
//!
//! CREATE TABLE records (
//!     id TEXT PRIMARY KEY,
//!     kind TEXT NOT NULL,
//!     content TEXT NOT NULL,
//!     attributes JSONB NOT NULL DEFAULT '{}'
//! );
//!
//! CREATE TABLE entities (
//!     id TEXT PRIMARY KEY,
//!     label TEXT NOT NULL,
//!     kind TEXT NOT NULL,
//!     properties JSONB NOT NULL DEFAULT '{}'
//! );
//!
//! CREATE TABLE relations (
//!     id TEXT PRIMARY KEY,
//!     source_id TEXT NOT NULL REFERENCES entities (id),
//!     target_id TEXT NOT NULL REFERENCES entities (id),
//!     relationship TEXT NOT NULL,
//!     properties JSONB NOT NULL DEFAULT '{}'
//! );
//! ```
//!
//! A row that does not decode fails the whole call.

use super::{GraphEdge, GraphHop, GraphNode, GraphStore, Record, RecordStore, VectorHit, VectorIndex};
use crate::predicate::Predicate;
use crate::types::Metadata;
use agentrag_common::db::DbPool;
use agentrag_common::errors::Result;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn metadata_from(value: Option<Value>) -> Metadata {
    match value {
        Some(Value::Object(map)) => map,
        _ => Metadata::new(),
    }
}

/// Render an embedding in pgvector text format
pub(crate) fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// pgvector cosine-distance index over the `documents` table
#[derive(Clone)]
pub struct PgVectorIndex {
    pool: DbPool,
}

impl PgVectorIndex {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn build_statement(embedding: &[f32], top_k: usize, filters: Option<&Predicate>) -> Statement {
        let (filter_sql, filter_values) = filters
            .map(|p| p.to_sql("metadata", 3))
            .unwrap_or_else(|| ("TRUE".to_string(), Vec::new()));

        let sql = format!(
            r#"
            SELECT
                id,
                content,
                metadata,
                (embedding <=> $1::vector)::float4 AS distance
            FROM documents
            WHERE embedding IS NOT NULL
            AND {}
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            filter_sql
        );

        let mut values: Vec<sea_orm::Value> = vec![
            vector_literal(embedding).into(),
            (top_k as i64).into(),
        ];
        values.extend(filter_values);

        Statement::from_sql_and_values(DbBackend::Postgres, &sql, values)
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn query(&self, embedding: &[f32], top_k: usize, filters: Option<&Predicate>) -> Result<Vec<VectorHit>> {
        let stmt = Self::build_statement(embedding, top_k, filters);

        self.pool.connection()
            .query_all(stmt)
            .await?
            .iter()
            .map(|row: &QueryResult| -> Result<VectorHit> {
                Ok(VectorHit {
                    id: row.try_get("", "id")?,
                    document: row.try_get("", "content")?,
                    metadata: metadata_from(row.try_get("", "metadata")?),
                    distance: row.try_get("", "distance")?,
                })
            })
            .collect()
    }
}

/// JSONB attribute store over the `records` table
#[derive(Clone)]
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn build_statement(predicate: &Predicate, kind: Option<&str>, limit: usize) -> Statement {
        let mut values: Vec<sea_orm::Value> = vec![(limit as i64).into()];

        let kind_filter = match kind {
            Some(kind) => {
                values.push(kind.to_lowercase().into());
                "AND lower(kind) = $2"
            }
            None => "",
        };

        let (filter_sql, filter_values) = predicate.to_sql("attributes", values.len() + 1);
        values.extend(filter_values);

        let sql = format!(
            r#"
            SELECT id, kind, content, attributes
            FROM records
            WHERE {}
            {}
            ORDER BY id
            LIMIT $1
            "#,
            filter_sql, kind_filter
        );

        Statement::from_sql_and_values(DbBackend::Postgres, &sql, values)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn select(&self, predicate: &Predicate, kind: Option<&str>, limit: usize) -> Result<Vec<Record>> {
        let stmt = Self::build_statement(predicate, kind, limit);

        self.pool.connection()
            .query_all(stmt)
            .await?
            .iter()
            .map(|row: &QueryResult| -> Result<Record> {
                Ok(Record {
                    id: row.try_get("", "id")?,
                    kind: row.try_get("", "kind")?,
                    content: row.try_get("", "content")?,
                    attributes: metadata_from(row.try_get("", "attributes")?),
                })
            })
            .collect()
    }
}

/// `$start, $start+1, ...` for `count` bind parameters
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn node_from_row(row: &QueryResult) -> Result<GraphNode> {
    Ok(GraphNode {
        id: row.try_get("", "id")?,
        label: row.try_get("", "label")?,
        kind: row.try_get("", "kind")?,
        properties: metadata_from(row.try_get("", "properties")?),
    })
}

/// A relation row joined with both of its entities
fn incident_from_row(row: &QueryResult) -> Result<(GraphEdge, GraphNode, GraphNode)> {
    let edge = GraphEdge {
        id: row.try_get("", "id")?,
        source_id: row.try_get("", "source_id")?,
        target_id: row.try_get("", "target_id")?,
        relationship: row.try_get("", "relationship")?,
        properties: metadata_from(row.try_get("", "properties")?),
    };
    let subject = GraphNode {
        id: edge.source_id.clone(),
        label: row.try_get("", "subject_label")?,
        kind: row.try_get("", "subject_kind")?,
        properties: metadata_from(row.try_get("", "subject_properties")?),
    };
    let object = GraphNode {
        id: edge.target_id.clone(),
        label: row.try_get("", "object_label")?,
        kind: row.try_get("", "object_kind")?,
        properties: metadata_from(row.try_get("", "object_properties")?),
    };

    Ok((edge, subject, object))
}

/// Endpoint of `edge` that lies on the current frontier
fn frontier_endpoint(edge: &GraphEdge, frontier: &HashSet<&str>) -> String {
    if frontier.contains(edge.source_id.as_str()) {
        edge.source_id.clone()
    } else {
        edge.target_id.clone()
    }
}

fn opposite(edge: &GraphEdge, node_id: &str) -> String {
    if edge.source_id == node_id {
        edge.target_id.clone()
    } else {
        edge.source_id.clone()
    }
}

/// Property graph over the `entities` and `relations` tables
///
/// Traversal runs one query per level, expanding the whole frontier at once.
#[derive(Clone)]
pub struct PgGraphStore {
    pool: DbPool,
}

impl PgGraphStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn find_nodes_statement(needle: &str, limit: usize) -> Statement {
        let sql = r#"
            SELECT id, label, kind, properties
            FROM entities
            WHERE btrim(label) <> ''
            AND (strpos(lower(btrim(label)), $1) > 0 OR strpos($1, lower(btrim(label))) > 0)
            ORDER BY id
            LIMIT $2
        "#;

        Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            vec![needle.into(), (limit as i64).into()],
        )
    }

    pub(crate) fn nodes_statement(ids: &[&str]) -> Statement {
        let sql = format!(
            "SELECT id, label, kind, properties FROM entities WHERE id IN ({})",
            placeholders(1, ids.len())
        );
        let values: Vec<sea_orm::Value> = ids.iter().map(|id| (*id).into()).collect();

        Statement::from_sql_and_values(DbBackend::Postgres, &sql, values)
    }

    /// Relations touching any frontier node, with both endpoints joined
    pub(crate) fn incident_statement(frontier: &[String], relationships: &[String], limit: Option<usize>) -> Statement {
        let mut values: Vec<sea_orm::Value> = frontier.iter().map(|id| id.clone().into()).collect();
        let ids = placeholders(1, frontier.len());

        let relationship_filter = if relationships.is_empty() {
            String::new()
        } else {
            let filter = format!(
                "AND upper(r.relationship) IN ({})",
                placeholders(values.len() + 1, relationships.len())
            );
            values.extend(relationships.iter().map(|r| r.to_uppercase().into()));
            filter
        };

        let limit_clause = match limit {
            Some(limit) => {
                values.push((limit as i64).into());
                format!("LIMIT ${}", values.len())
            }
            None => String::new(),
        };

        let sql = format!(
            r#"
            SELECT
                r.id,
                r.source_id,
                r.target_id,
                r.relationship,
                r.properties,
                s.label AS subject_label,
                s.kind AS subject_kind,
                s.properties AS subject_properties,
                t.label AS object_label,
                t.kind AS object_kind,
                t.properties AS object_properties
            FROM relations r
            JOIN entities s ON s.id = r.source_id
            JOIN entities t ON t.id = r.target_id
            WHERE (r.source_id IN ({ids}) OR r.target_id IN ({ids}))
            {relationship_filter}
            ORDER BY r.id
            {limit_clause}
            "#
        );

        Statement::from_sql_and_values(DbBackend::Postgres, &sql, values)
    }

    async fn incident(
        &self,
        frontier: &[String],
        relationships: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<(GraphEdge, GraphNode, GraphNode)>> {
        let stmt = Self::incident_statement(frontier, relationships, limit);

        self.pool.connection()
            .query_all(stmt)
            .await?
            .iter()
            .map(incident_from_row)
            .collect()
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn find_nodes(&self, text: &str, limit: usize) -> Result<Vec<GraphNode>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        self.pool.connection()
            .query_all(Self::find_nodes_statement(&needle, limit))
            .await?
            .iter()
            .map(node_from_row)
            .collect()
    }

    async fn neighborhood(
        &self,
        node_id: &str,
        depth: usize,
        relationships: &[String],
        limit: usize,
    ) -> Result<Vec<GraphHop>> {
        let mut visited: HashSet<String> = HashSet::from([node_id.to_string()]);
        let mut emitted: HashSet<String> = HashSet::new();
        let mut frontier = vec![node_id.to_string()];
        let mut hops = Vec::new();

        for level in 1..=depth {
            if hops.len() >= limit {
                break;
            }

            // rows already emitted at an earlier level come back too
            let wanted = limit - hops.len() + emitted.len();
            let rows = self.incident(&frontier, relationships, Some(wanted)).await?;

            let on_frontier: HashSet<&str> = frontier.iter().map(String::as_str).collect();
            let mut next = Vec::new();
            for (edge, subject, object) in rows {
                if !emitted.insert(edge.id.clone()) {
                    continue;
                }
                let from_id = frontier_endpoint(&edge, &on_frontier);
                let other = opposite(&edge, &from_id);
                if visited.insert(other.clone()) {
                    next.push(other);
                }

                hops.push(GraphHop {
                    edge,
                    subject,
                    object,
                    hops: level,
                    from_id,
                });
                if hops.len() >= limit {
                    return Ok(hops);
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
        let ids: Vec<&str> = if source_id == target_id {
            vec![source_id]
        } else {
            vec![source_id, target_id]
        };
        let found = self.pool.connection().query_all(Self::nodes_statement(&ids)).await?;
        if found.len() < ids.len() {
            return Ok(None);
        }
        if source_id == target_id {
            return Ok(Some(Vec::new()));
        }

        // node id -> hop used to reach it
        let mut parents: HashMap<String, GraphHop> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([source_id.to_string()]);
        let mut frontier = vec![source_id.to_string()];

        for level in 1..=max_depth {
            let rows = self.incident(&frontier, &[], None).await?;

            let on_frontier: HashSet<&str> = frontier.iter().map(String::as_str).collect();
            let mut next = Vec::new();
            for (edge, subject, object) in rows {
                let from_id = frontier_endpoint(&edge, &on_frontier);
                let other = opposite(&edge, &from_id);
                if visited.insert(other.clone()) {
                    next.push(other.clone());
                    parents.insert(
                        other,
                        GraphHop {
                            edge,
                            subject,
                            object,
                            hops: level,
                            from_id,
                        },
                    );
                }
            }

            if visited.contains(target_id) || next.is_empty() {
                break;
            }
            frontier = next;
        }

        if !parents.contains_key(target_id) {
            return Ok(None);
        }

        let mut path = Vec::new();
        let mut cursor = target_id.to_string();
        while let Some(hop) = parents.remove(&cursor) {
            cursor = hop.from_id.clone();
            path.push(hop);
        }
        path.reverse();

        Ok(Some(path))
    }
}

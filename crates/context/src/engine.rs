//! Engine context
//!
//! The shared collaborators (configuration, retrieval tools, language model,
//! conversation memory) are built once at process start and handed to the
//! reasoning stream. Nothing here is global.

use crate::memory::ConversationMemory;
use agentrag_common::config::AppConfig;
use agentrag_common::db::DbPool;
use agentrag_common::embeddings::{create_embedder, Embedder};
use agentrag_common::errors::Result;
use agentrag_common::llm::{create_language_model, LanguageModel};
use agentrag_common::metrics;
use agentrag_retrieval::backends::{
    GraphStore, PgGraphStore, PgRecordStore, PgVectorIndex, RecordStore, VectorIndex,
};
use agentrag_retrieval::tools::{GraphTraversalTool, LogicalFilterTool, SimilaritySearchTool};
use agentrag_retrieval::{AdaptiveRetrieval, SourceType, ToolSet};
use std::sync::Arc;
use tracing::info;

/// Everything a reasoning stream needs
pub struct EngineContext {
    config: AppConfig,
    retrieval: Arc<AdaptiveRetrieval>,
    memory: Arc<ConversationMemory>,
    language_model: Option<Arc<dyn LanguageModel>>,
    embedder: Arc<dyn Embedder>,
}

impl EngineContext {
    pub fn builder(config: AppConfig) -> EngineContextBuilder {
        EngineContextBuilder::new(config)
    }

    /// Context backed by Postgres when a database is configured, tool-less otherwise
    pub async fn connect(config: AppConfig) -> Result<Self> {
        metrics::register_metrics();

        let Some(database) = config.database.clone() else {
            info!("No database configured, starting without retrieval backends");
            return Self::builder(config).build();
        };

        let pool = DbPool::new(&database).await?;
        pool.ping().await?;
        Self::builder(config).postgres(pool).build()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn retrieval(&self) -> &Arc<AdaptiveRetrieval> {
        &self.retrieval
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn language_model(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.language_model.as_ref()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }
}

/// Builder for [`EngineContext`]
///
/// Collaborators not supplied are created from the configuration. Backing
/// stores are wrapped in their retrieval tool; explicit tools take precedence.
pub struct EngineContextBuilder {
    config: AppConfig,
    embedder: Option<Arc<dyn Embedder>>,
    language_model: Option<Option<Arc<dyn LanguageModel>>>,
    memory: Option<Arc<ConversationMemory>>,
    tools: ToolSet,
    vector_index: Option<Arc<dyn VectorIndex>>,
    graph_store: Option<Arc<dyn GraphStore>>,
    record_store: Option<Arc<dyn RecordStore>>,
}

impl EngineContextBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            embedder: None,
            language_model: None,
            memory: None,
            tools: ToolSet::new(),
            vector_index: None,
            graph_store: None,
            record_store: None,
        }
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(Some(model));
        self
    }

    /// Always answer extractively, whatever the configuration says
    pub fn without_language_model(mut self) -> Self {
        self.language_model = Some(None);
        self
    }

    pub fn memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    pub fn graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.graph_store = Some(store);
        self
    }

    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    /// Back all three tools with tables in one Postgres database
    pub fn postgres(self, pool: DbPool) -> Self {
        self.vector_index(Arc::new(PgVectorIndex::new(pool.clone())))
            .graph_store(Arc::new(PgGraphStore::new(pool.clone())))
            .record_store(Arc::new(PgRecordStore::new(pool)))
    }

    pub fn build(self) -> Result<EngineContext> {
        let config = self.config;
        let timeout = config.tool_timeout();

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => create_embedder(&config.embedding)?,
        };

        let language_model = match self.language_model {
            Some(model) => model,
            None => create_language_model(&config.llm)?,
        };

        let mut tools = self.tools;
        if tools.get(SourceType::Vector).is_none() {
            if let Some(index) = self.vector_index {
                tools = tools.with_vector(Arc::new(
                    SimilaritySearchTool::new(embedder.clone(), index).with_timeout(timeout),
                ));
            }
        }
        if tools.get(SourceType::Graph).is_none() {
            if let Some(store) = self.graph_store {
                tools = tools.with_graph(Arc::new(GraphTraversalTool::new(store).with_timeout(timeout)));
            }
        }
        if tools.get(SourceType::Filter).is_none() {
            if let Some(store) = self.record_store {
                tools = tools.with_filter(Arc::new(LogicalFilterTool::new(store).with_timeout(timeout)));
            }
        }

        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(ConversationMemory::new(&config.memory)));

        info!(
            tools = ?tools.available(),
            language_model = language_model.as_ref().map(|m| m.model_name()).unwrap_or("none"),
            embedder = embedder.model_name(),
            "Engine context ready"
        );

        Ok(EngineContext {
            retrieval: Arc::new(AdaptiveRetrieval::new(tools, &config.retrieval)),
            config,
            memory,
            language_model,
            embedder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrag_common::embeddings::MockEmbedder;
    use agentrag_retrieval::backends::{InMemoryGraphStore, InMemoryRecordStore, InMemoryVectorIndex};
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[test]
    fn test_defaults_from_config() {
        let context = EngineContext::builder(AppConfig::default()).build().unwrap();
        assert!(context.language_model().is_none());
        assert!(context.retrieval().tools().is_empty());
        assert_eq!(context.memory().max_messages(), 20);
        assert_eq!(context.memory().context_window(), 6);
        assert_eq!(context.embedder().model_name(), "mock-embedding");
    }

    #[test]
    fn test_stores_become_tools() {
        let context = EngineContext::builder(AppConfig::default())
            .embedder(Arc::new(MockEmbedder::new(16)))
            .vector_index(Arc::new(InMemoryVectorIndex::new()))
            .graph_store(Arc::new(InMemoryGraphStore::new()))
            .record_store(Arc::new(InMemoryRecordStore::new()))
            .build()
            .unwrap();

        assert_eq!(
            context.retrieval().tools().available(),
            vec!["vector_search", "graph_traversal", "logical_filter"]
        );
    }

    #[test]
    fn test_postgres_backs_every_tool() {
        let pool = DbPool::from_connection(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let context = EngineContext::builder(AppConfig::default())
            .embedder(Arc::new(MockEmbedder::new(16)))
            .postgres(pool)
            .build()
            .unwrap();

        assert_eq!(
            context.retrieval().tools().available(),
            vec!["vector_search", "graph_traversal", "logical_filter"]
        );
    }

    #[tokio::test]
    async fn test_connect_without_database() {
        let context = EngineContext::connect(AppConfig::default()).await.unwrap();
        assert!(context.config().database.is_none());
        assert!(context.retrieval().tools().is_empty());
    }

    #[test]
    fn test_unknown_llm_provider_is_rejected() {
        let mut config = AppConfig::default();
        config.llm.provider = "carrier-pigeon".to_string();
        assert!(EngineContext::builder(config.clone()).build().is_err());
        assert!(EngineContext::builder(config).without_language_model().build().is_ok());
    }
}

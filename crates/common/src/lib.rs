//! AgentRAG Common Library
//!
//! Shared code for the AgentRAG engine crates including:
//! - Error types and handling
//! - Configuration management
//! - Logging initialisation and metrics
//! - Embedding client abstraction
//! - Language model client abstraction
//! - Postgres connection pool

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default maximum number of retrieval results
pub const DEFAULT_MAX_RESULTS: usize = 10;

//! Configuration management for AgentRAG
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Retrieval orchestration configuration
    pub retrieval: RetrievalConfig,

    /// Conversation memory configuration
    pub memory: MemoryConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    pub llm: LlmConfig,

    /// Database configuration (optional, for Postgres-backed stores)
    pub database: Option<DatabaseConfig>,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Results requested when the caller does not say
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,

    /// Upper bound accepted for `max_results`
    #[serde(default = "default_max_results_limit")]
    pub max_results_limit: usize,

    /// Below this complexity the vector-only strategy is always chosen
    #[serde(default = "default_low_complexity")]
    pub low_complexity_threshold: f32,

    /// Above this complexity the adaptive strategy is always chosen
    #[serde(default = "default_high_complexity")]
    pub high_complexity_threshold: f32,

    /// Mean vector score above which adaptive retrieval supplements instead of escalating
    #[serde(default = "default_adaptive_quality")]
    pub adaptive_quality_threshold: f32,

    /// Neighborhood depth used by graph traversal
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,

    /// Per-tool timeout in milliseconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_ms: u64,

    /// Longest query accepted by the analyzer
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Strategy forced for every request (vector_only, graph_only, filter_only, hybrid, adaptive)
    pub default_strategy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Messages retained per conversation
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Messages returned as context
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Language model provider: none, openai
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum output tokens
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_results() -> usize { 10 }
fn default_max_results_limit() -> usize { 100 }
fn default_low_complexity() -> f32 { 0.3 }
fn default_high_complexity() -> f32 { 0.7 }
fn default_adaptive_quality() -> f32 { 0.7 }
fn default_graph_depth() -> usize { 1 }
fn default_tool_timeout() -> u64 { 5_000 }
fn default_max_query_chars() -> usize { 4_000 }
fn default_max_messages() -> usize { 20 }
fn default_context_window() -> usize { 6 }
fn default_embedding_provider() -> String { "mock".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_llm_provider() -> String { "none".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 30 }
fn default_llm_max_tokens() -> usize { 500 }
fn default_llm_temperature() -> f32 { 0.7 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "agentrag".to_string() }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
            max_results_limit: default_max_results_limit(),
            low_complexity_threshold: default_low_complexity(),
            high_complexity_threshold: default_high_complexity(),
            adaptive_quality_threshold: default_adaptive_quality(),
            graph_depth: default_graph_depth(),
            tool_timeout_ms: default_tool_timeout(),
            max_query_chars: default_max_query_chars(),
            default_strategy: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            context_window: default_context_window(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env if present
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__TOOL_TIMEOUT_MS=2000
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the per-tool timeout as Duration
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval.tool_timeout_ms)
    }
}

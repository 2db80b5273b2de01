//! Error types for AgentRAG
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Classification of upstream failures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFilter,

    // Engine errors (2xxx)
    ToolUnavailable,
    QueryAnalysisFailure,
    GenerationFailure,
    NoUsableResults,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFilter => 1002,

            // Engine (2xxx)
            ErrorCode::ToolUnavailable => 2001,
            ErrorCode::QueryAnalysisFailure => 2002,
            ErrorCode::GenerationFailure => 2003,
            ErrorCode::NoUsableResults => 2004,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid filter on field '{field}': {message}")]
    InvalidFilter { field: String, message: String },

    // Engine errors
    #[error("Tool unavailable: {tool}: {message}")]
    ToolUnavailable { tool: String, message: String },

    #[error("Query analysis failed: {message}")]
    QueryAnalysis { message: String },

    #[error("Answer generation failed: {message}")]
    Generation { message: String },

    #[error("No usable retrieval results")]
    NoUsableResults,

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a `ToolUnavailable` error
    pub fn tool_unavailable(tool: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ToolUnavailable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFilter { .. } => ErrorCode::InvalidFilter,
            AppError::ToolUnavailable { .. } => ErrorCode::ToolUnavailable,
            AppError::QueryAnalysis { .. } => ErrorCode::QueryAnalysisFailure,
            AppError::Generation { .. } => ErrorCode::GenerationFailure,
            AppError::NoUsableResults => ErrorCode::NoUsableResults,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Errors caused by backing stores or upstream services
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::ToolUnavailable { .. }
                | AppError::Database(_)
                | AppError::DatabaseConnection { .. }
                | AppError::EmbeddingError { .. }
                | AppError::EmbeddingTimeout { .. }
                | AppError::HttpClient(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::tool_unavailable("graph_traversal", "connection refused");
        assert_eq!(err.code(), ErrorCode::ToolUnavailable);
        assert_eq!(err.code().as_code(), 2001);
        assert!(err.to_string().contains("graph_traversal"));
    }

    #[test]
    fn test_upstream_classification() {
        let err = AppError::EmbeddingTimeout { timeout_ms: 500 };
        assert!(err.is_upstream());
        assert_eq!(err.code(), ErrorCode::EmbeddingTimeout);

        let invalid = AppError::InvalidFilter {
            field: "founded".to_string(),
            message: "in/not_in require a set-valued (array) value".to_string(),
        };
        assert!(!invalid.is_upstream());
    }
}

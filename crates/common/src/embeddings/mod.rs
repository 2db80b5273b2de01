//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible endpoints (text-embedding-3-small, text-embedding-ada-002)
//! - Deterministic mock embeddings for tests and offline runs

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RETRY_INITIAL_INTERVAL_MS: u64 = 100;
const RETRY_MAX_INTERVAL_SECS: u64 = 5;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "embedding.api_key is required for the openai provider".to_string(),
        })?;

        let dimension = match config.model.as_str() {
            "text-embedding-ada-002" => 1536,
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            _ => config.dimension,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries.max(1),
        })
    }

    /// Make request with retry
    ///
    /// Connection failures, timeouts, 429 and 5xx responses are retried with
    /// exponential backoff, at most `max_retries` attempts in total.
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(RETRY_INITIAL_INTERVAL_MS),
            max_interval: Duration::from_secs(RETRY_MAX_INTERVAL_SECS),
            max_elapsed_time: Some(self.timeout * (self.max_retries + 1)),
            ..ExponentialBackoff::default()
        };

        retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let start = Instant::now();
            let outcome = self.make_request(texts).await;
            metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, texts.len(), outcome.is_ok());

            match outcome {
                Ok(embeddings) => Ok(embeddings),
                Err(backoff::Error::Transient { err, .. }) if attempt < self.max_retries => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "Embedding request failed, retrying"
                    );
                    Err(backoff::Error::transient(err))
                }
                Err(backoff::Error::Transient { err, .. }) | Err(backoff::Error::Permanent(err)) => {
                    Err(backoff::Error::permanent(err))
                }
            }
        })
        .await
    }

    async fn make_request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, backoff::Error<AppError>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    backoff::Error::transient(AppError::EmbeddingTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                } else {
                    backoff::Error::transient(AppError::EmbeddingError {
                        message: format!("Request failed: {}", e),
                    })
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status,
                AppError::EmbeddingError {
                    message: format!("API error {}: {}", status, body),
                },
            ));
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })
        })?;

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

/// Rate limiting and server errors are worth retrying, anything else is not
fn classify_status(status: StatusCode, error: AppError) -> backoff::Error<AppError> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        backoff::Error::transient(error)
    } else {
        backoff::Error::permanent(error)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // OpenAI has a limit of 2048 texts per request
        const BATCH_SIZE: usize = 100;

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for testing
///
/// The same text always maps to the same unit-length vector.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut hasher = DefaultHasher::new();
        text.trim().to_lowercase().hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let raw: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            raw.into_iter().map(|x| x / norm).collect()
        } else {
            raw
        }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => {
            tracing::warn!(provider = other, "Unknown embedding provider, using mock");
            Ok(Arc::new(MockEmbedder::new(config.dimension)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new(64);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 64);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("Apple Inc.").await.unwrap();
        let b = embedder.embed("apple inc.  ").await.unwrap();
        let c = embedder.embed("Steve Jobs").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_mock_batch() {
        let embedder = MockEmbedder::new(16);
        let texts = vec!["text1".to_string(), "text2".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 16);
    }

    #[test]
    fn test_retryable_statuses() {
        let error = || AppError::EmbeddingError { message: "boom".to_string() };

        for status in [StatusCode::TOO_MANY_REQUESTS, StatusCode::INTERNAL_SERVER_ERROR, StatusCode::SERVICE_UNAVAILABLE] {
            assert!(matches!(classify_status(status, error()), backoff::Error::Transient { .. }));
        }
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED, StatusCode::NOT_FOUND] {
            assert!(matches!(classify_status(status, error()), backoff::Error::Permanent(_)));
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_gives_up() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            api_base: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 1,
            max_retries: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = OpenAIEmbedder::new(&config).unwrap();

        let err = embedder.embed("Apple Inc.").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::EmbeddingError { .. } | AppError::EmbeddingTimeout { .. }
        ));
        assert!(err.is_upstream());
    }

    #[test]
    fn test_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}

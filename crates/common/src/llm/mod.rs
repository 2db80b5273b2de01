//! Language model abstraction
//!
//! A narrow `generate(prompt) -> text` capability. The engine treats a missing
//! model as a normal configuration and answers extractively instead.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Text generation capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

const SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant that provides accurate information based on retrieved context.";

/// OpenAI-compatible chat completions client
pub struct OpenAIChatModel {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIChatModel {
    /// Create a new chat model client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key is required for the openai provider".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self.client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await
            .map_err(|e| AppError::Generation {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::Generation {
                message: "Empty response from LLM".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Create a language model from configuration; `None` selects extractive answers
pub fn create_language_model(config: &LlmConfig) -> Result<Option<Arc<dyn LanguageModel>>> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAIChatModel::new(config)?))),
        other => Err(AppError::Configuration {
            message: format!("Unknown llm provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_provider_disables_model() {
        let model = create_language_model(&LlmConfig::default()).unwrap();
        assert!(model.is_none());
    }

    #[test]
    fn test_openai_provider_requires_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_language_model(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_openai_provider_builds_client() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        let model = create_language_model(&config).unwrap().unwrap();
        assert_eq!(model.model_name(), "gpt-4o-mini");
    }
}

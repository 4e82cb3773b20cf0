pub mod anthropic;
pub mod gemini;
pub mod models;
pub mod openai;

use anthropic::AnthropicProvider;
use gemini::GeminiProvider;
use openai::OpenAiProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use models::{ChatOptions, ChatResponse, Message};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error: {0}")]
    Api(String),
    #[error("Invalid Response: {0}")]
    InvalidResponse(String),
    #[error("Rate Limited")]
    RateLimited,
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// The text-generation capability. Messages arrive in prompt order and the
/// implementation must not reorder them.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError>;
}

/// Builds the provider named by `llm.provider`.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_default(config: &AppConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let provider_name = config.llm.provider.as_str();
        let missing = || LlmError::NotConfigured(format!("llm.{} section is missing", provider_name));

        match provider_name {
            "openai" => {
                let cfg = config.llm.openai.as_ref().ok_or_else(missing)?;
                Ok(Arc::new(OpenAiProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                )))
            }
            "anthropic" => {
                let cfg = config.llm.anthropic.as_ref().ok_or_else(missing)?;
                Ok(Arc::new(AnthropicProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                )))
            }
            "gemini" => {
                let cfg = config.llm.gemini.as_ref().ok_or_else(missing)?;
                Ok(Arc::new(GeminiProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                )))
            }
            other => Err(LlmError::NotConfigured(format!("unknown provider '{}'", other))),
        }
    }
}

/// Shared status handling for the HTTP back-ends.
pub(crate) async fn check_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, LlmError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }
    Err(LlmError::Api(format!("{} Error {}: {}", provider, status, text)))
}

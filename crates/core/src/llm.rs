use crate::error::{ConfigError, GenerationError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::debug;

const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const OPENAI_ENDPOINT: &str = "https://api.openai.com";

/// Text-in, text-out capability of an LLM provider. One implementing
/// variant per provider; the variant is chosen once at construction
/// from the tagged config, never re-checked per call.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
}

/// Selects and constructs the provider client. A missing credential is
/// fatal here so a misconfigured orchestrator can never be built.
pub fn build_language_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>, ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(match config.provider {
            LlmProvider::Anthropic => {
                ConfigError::MissingApiKey("anthropic", "ANTHROPIC_API_KEY")
            }
            LlmProvider::OpenAi => ConfigError::MissingApiKey("openai", "OPENAI_API_KEY"),
        });
    }

    Ok(match config.provider {
        LlmProvider::Anthropic => Box::new(AnthropicChat::new(&config.api_key, &config.model)),
        LlmProvider::OpenAi => Box::new(OpenAiChat::new(&config.api_key, &config.model)),
    })
}

pub struct AnthropicChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl AnthropicChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: ANTHROPIC_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl LanguageModel for AnthropicChat {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "temperature": temperature,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Provider {
                provider: "anthropic",
                status: status.as_u16(),
                details: response.text().await.unwrap_or_default(),
            });
        }

        let payload: Value = response.json().await?;
        let answer = payload
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(GenerationError::EmptyResponse)?;

        debug!(chars = answer.len(), "anthropic answer received");
        Ok(answer)
    }
}

pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: OPENAI_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "temperature": temperature,
                "max_tokens": max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Provider {
                provider: "openai",
                status: status.as_u16(),
                details: response.text().await.unwrap_or_default(),
            });
        }

        let payload: Value = response.json().await?;
        let answer = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(GenerationError::EmptyResponse)?;

        debug!(chars = answer.len(), "openai answer received");
        Ok(answer)
    }
}

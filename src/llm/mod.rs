mod gemini;
mod ollama;
mod openai;

use crate::config::env_non_empty;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Request to generate a completion
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions sent as the system/developer message
    pub system: Option<String>,
    /// The prompt text
    pub prompt: String,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
    /// Ask the provider to constrain its output to a JSON document
    pub json_output: bool,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "gemini", "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for the given request
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Which backend to use for summarization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Ollama,
}

impl std::str::FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(LlmError::ConfigError(format!(
                "Unknown LLM_PROVIDER '{}', expected gemini, openai or ollama",
                other
            ))),
        }
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Explicit provider choice; when unset the first configured one wins
    pub provider: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_base_url: Option<String>,
    pub ollama_model: String,
    /// Timeout for a single summarization call
    pub default_timeout: Duration,
    /// Max tokens for a summarization response
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(60),
            default_max_tokens: 2048,
        }
    }
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            provider: env_non_empty("LLM_PROVIDER"),
            gemini_api_key: env_non_empty("GEMINI_API_KEY")
                .or_else(|| env_non_empty("GOOGLE_GENERATIVE_AI_API_KEY")),
            gemini_model: env_non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            openai_api_key: env_non_empty("OPENAI_API_KEY"),
            openai_model: env_non_empty("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url: env_non_empty("OLLAMA_BASE_URL"),
            ollama_model: env_non_empty("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: env_non_empty("LLM_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: env_non_empty("LLM_MAX_TOKENS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_max_tokens),
        }
    }

    /// Resolve which provider to build
    pub fn provider_kind(&self) -> LlmResult<ProviderKind> {
        if let Some(explicit) = &self.provider {
            return explicit.parse();
        }

        if self.gemini_api_key.is_some() {
            Ok(ProviderKind::Gemini)
        } else if self.openai_api_key.is_some() {
            Ok(ProviderKind::OpenAi)
        } else if self.ollama_base_url.is_some() {
            Ok(ProviderKind::Ollama)
        } else {
            Err(LlmError::ConfigError(
                "No LLM provider configured. Set GEMINI_API_KEY, OPENAI_API_KEY or OLLAMA_BASE_URL"
                    .to_string(),
            ))
        }
    }

    /// Build the configured provider
    pub fn build_provider(&self) -> LlmResult<Arc<dyn LlmProvider>> {
        match self.provider_kind()? {
            ProviderKind::Gemini => {
                let api_key = self.gemini_api_key.clone().ok_or_else(|| {
                    LlmError::ConfigError("GEMINI_API_KEY is not set".to_string())
                })?;
                Ok(Arc::new(GeminiProvider::new(
                    api_key,
                    self.gemini_model.clone(),
                )?))
            }
            ProviderKind::OpenAi => {
                let api_key = self.openai_api_key.clone().ok_or_else(|| {
                    LlmError::ConfigError("OPENAI_API_KEY is not set".to_string())
                })?;
                Ok(Arc::new(OpenAiProvider::new(
                    api_key,
                    self.openai_model.clone(),
                )))
            }
            ProviderKind::Ollama => {
                let base_url = self
                    .ollama_base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());
                Ok(Arc::new(OllamaProvider::new(
                    base_url,
                    self.ollama_model.clone(),
                )?))
            }
        }
    }
}

pub mod response;
pub mod gemini;
pub mod ollama;
pub mod retry;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use retry::{RetryConfig, RetryPolicy};

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use schema::GroundingMetadata;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0}")]
    Configuration(String),
    #[error("model provider responded with {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected model response: {0}")]
    Decode(String),
    #[error("model returned no text")]
    Empty,
}

impl GenerationError {
    /// Transport failures, rate limiting and provider-side errors are
    /// transient; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Transport(_) => true,
            GenerationError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerateOptions {
    /// Let the provider ground the answer with web search.
    pub web_search: bool,
    /// Ask for a bare JSON object.
    pub json_output: bool,
    pub temperature: Option<f32>,
}

impl GenerateOptions {
    pub fn grounded() -> Self {
        Self {
            web_search: true,
            ..Self::default()
        }
    }

    pub fn json() -> Self {
        Self {
            json_output: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub grounding_metadata: Option<GroundingMetadata>,
}

/// A language model that turns a prompt into text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, GenerationError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Ollama,
}

impl FromStr for Provider {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "ollama" => Ok(Provider::Ollama),
            other => Err(GenerationError::Configuration(format!(
                "LLM_PROVIDER has an invalid value '{}'. Set it to 'google' or 'ollama'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Build the configured provider client behind the `Generator` seam.
pub fn build_generator(
    config: &GenerationConfig,
    retry: RetryPolicy,
) -> Result<Arc<dyn Generator>, GenerationError> {
    if config.model.trim().is_empty() {
        return Err(GenerationError::Configuration(
            "MODEL is not set. Add it to the environment settings.".to_string(),
        ));
    }

    match config.provider {
        Provider::Google => Ok(Arc::new(GeminiClient::new(config, retry)?)),
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(config, retry)?)),
    }
}


const BODY_EXCERPT_CHARS: usize = 500;

/// Send a request and decode a JSON body, mapping non-success statuses to
/// `GenerationError::Upstream`.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, GenerationError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(GenerationError::Upstream {
            status,
            body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
        });
    }

    response
        .json()
        .await
        .map_err(|e| GenerationError::Decode(e.to_string()))
}

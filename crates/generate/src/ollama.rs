use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::response::into_generation;
use crate::{
    GenerateOptions, Generation, GenerationConfig, GenerationError, Generator, RetryPolicy,
    send_json,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>, // "json" for structured output
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

impl OllamaClient {
    pub fn new(config: &GenerationConfig, retry: RetryPolicy) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            client,
            retry,
        })
    }
}

// Ollama has no web-search tool, so `web_search` is ignored here and the
// answer simply carries no grounding metadata.
#[async_trait]
impl Generator for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, GenerationError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: options.json_output.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature.unwrap_or(self.temperature),
            },
        };

        let response = self
            .retry
            .retry("ollama.generate", || send_json(self.client.post(&url).json(&request)))
            .await?;

        into_generation(&response)
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::response::into_generation;
use crate::{
    GenerateOptions, Generation, GenerationConfig, GenerationError, Generator, RetryPolicy,
    send_json,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<serde_json::Value>,
    generation_config: serde_json::Value,
    safety_settings: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

impl GeminiClient {
    pub fn new(config: &GenerationConfig, retry: RetryPolicy) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::Configuration(
                    "GEMINI_API_KEY is not set. Add it to the environment settings.".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            client,
            retry,
        })
    }

    fn build_request(&self, prompt: &str, options: &GenerateOptions) -> GeminiRequest {
        let mut generation_config = json!({
            "temperature": options.temperature.unwrap_or(self.temperature),
        });
        if options.json_output {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let tools = if options.web_search {
            vec![json!({ "googleSearch": {} })]
        } else {
            Vec::new()
        };

        GeminiRequest {
            contents: vec![json!({ "role": "user", "parts": [{ "text": prompt }] })],
            generation_config,
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| json!({ "category": category, "threshold": "BLOCK_MEDIUM_AND_ABOVE" }))
                .collect(),
            tools,
        }
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = self.build_request(prompt, options);

        debug!(model = %self.model, web_search = options.web_search, "Sending prompt to Gemini");

        let response = self
            .retry
            .retry("gemini.generate", || {
                send_json(
                    self.client
                        .post(&url)
                        .header("x-goog-api-key", &self.api_key)
                        .json(&request),
                )
            })
            .await?;

        into_generation(&response)
    }
}

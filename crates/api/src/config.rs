use generate::{GenerationConfig, Provider, RetryConfig};
use query::PipelineMode;
use retrieve::RetrievalConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set. Add it to the environment settings.")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: PipelineMode,
    pub bind_addr: String,
    pub log_format: LogFormat,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Resolve from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let provider_raw = require("LLM_PROVIDER")?;
        let provider = provider_raw
            .parse::<Provider>()
            .map_err(|_| ConfigError::Invalid { name: "LLM_PROVIDER", value: provider_raw })?;
        let model = require("MODEL")?;

        let (api_key, base_url) = match provider {
            Provider::Google => (Some(require("GEMINI_API_KEY")?), None),
            Provider::Ollama => (
                None,
                Some(get("OLLAMA_BASE_URL").unwrap_or_else(|| "http://localhost:11434".to_string())),
            ),
        };

        let timeout_secs = parse_or(&get, "REQUEST_TIMEOUT_SECS", 60u64)?;

        let generation = GenerationConfig {
            provider,
            model,
            api_key,
            base_url,
            temperature: parse_or(&get, "GENERATION_TEMPERATURE", 0.7f32)?,
            timeout_secs,
        };

        let defaults = RetrievalConfig::default();
        let retrieval = RetrievalConfig {
            retrieval_url: require("VECTORIZE_RETRIEVAL_URL")?,
            token: require("VECTORIZE_TOKEN")?,
            diagram_url: get("DIAGRAM_API_URL").unwrap_or(defaults.diagram_url),
            knowledge_base_domain: get("KNOWLEDGE_BASE_DOMAIN").unwrap_or(defaults.knowledge_base_domain),
            timeout_secs,
            ..defaults
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: parse_or(&get, "RETRY_MAX", retry_defaults.max_retries)?,
            initial_backoff_ms: parse_or(&get, "RETRY_INITIAL_BACKOFF_MS", retry_defaults.initial_backoff_ms)?,
            max_backoff_ms: parse_or(&get, "RETRY_MAX_BACKOFF_MS", retry_defaults.max_backoff_ms)?,
        };

        let mode = match get("PIPELINE_MODE").map(|v| v.to_lowercase()) {
            None => PipelineMode::default(),
            Some(v) => match v.as_str() {
                "fast" => PipelineMode::Fast,
                "balanced" => PipelineMode::Balanced,
                "full" => PipelineMode::Full,
                _ => return Err(ConfigError::Invalid { name: "PIPELINE_MODE", value: v }),
            },
        };

        let log_format = match get("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            mode,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            log_format,
            generation,
            retrieval,
            retry,
        })
    }
}

fn parse_or<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

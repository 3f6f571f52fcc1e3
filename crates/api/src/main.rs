mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use generate::{RetryPolicy, build_generator};
use query::{AnswerPipeline, PipelineOptions};
use retrieve::VectorizeClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogFormat};
use crate::metrics::Metrics;
use crate::routes::{AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    // Model provider behind the Generator seam
    let generator = build_generator(&config.generation, RetryPolicy::from(&config.retry))
        .context("Failed to create model client")?;

    // Knowledge base + diagram service
    let retriever = Arc::new(
        VectorizeClient::new(config.retrieval.clone()).context("Failed to create retrieval client")?,
    );

    info!(
        retrieval_url = %retriever.config().retrieval_url,
        diagram_url = %retriever.config().diagram_url,
        knowledge_base = %retriever.config().knowledge_base_domain,
        "Retrieval client ready"
    );

    let pipeline = AnswerPipeline::new(generator, retriever, PipelineOptions::for_mode(config.mode));
    let options = pipeline.options().clone();
    let app = router(AppState::new(pipeline, Metrics::new()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!(
        addr = %config.bind_addr,
        mode = ?config.mode,
        provider = ?config.generation.provider,
        model = %config.generation.model,
        rewrite = options.rewrite_query,
        diagrams = options.diagrams,
        web_search = options.web_search,
        "Server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

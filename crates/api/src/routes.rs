use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use query::AnswerPipeline;
use schema::ConversationMessage;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;
use wire::{DIAGRAM_COUNT_HEADER, EncodeError, HAS_DIAGRAMS_HEADER, STREAM_DATA_HEADER, encode_frames};

use crate::error::ApiError;
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<AnswerPipeline>,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(pipeline: AnswerPipeline, metrics: Arc<Metrics>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            metrics,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(STREAM_DATA_HEADER),
            HeaderName::from_static(HAS_DIAGRAMS_HEADER),
            HeaderName::from_static(DIAGRAM_COUNT_HEADER),
        ]);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", request_id = %request_id);
    answer(state, payload).instrument(span).await
}

async fn answer(
    state: AppState,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.inspect_err(|_| state.metrics.record_rejection())?;
    info!(messages = request.messages.len(), "Chat request received");

    let timer = TimedOperation::start();
    let result = match state.pipeline.run(&request.messages).await {
        Ok(result) => result,
        Err(e) => {
            if e.is_client_error() {
                state.metrics.record_rejection();
            } else {
                state.metrics.record_request(false);
            }
            return Err(e.into());
        }
    };
    let elapsed = timer.elapsed();
    state.metrics.record_request(true);
    state.metrics.record_pipeline(elapsed, &result);

    let frames = encode_frames(&result)
        .into_iter()
        .collect::<Result<Vec<String>, EncodeError>>()?;

    info!(
        diagrams = result.diagrams.len(),
        references = result.references.len(),
        fallbacks = ?result.trace.fallbacks,
        elapsed_ms = elapsed.as_millis() as u64,
        "Streaming answer"
    );

    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
        (HeaderName::from_static(STREAM_DATA_HEADER), "true".to_string()),
        (HeaderName::from_static(HAS_DIAGRAMS_HEADER), result.has_diagrams().to_string()),
        (HeaderName::from_static(DIAGRAM_COUNT_HEADER), result.diagrams.len().to_string()),
    ];
    let body = Body::from_stream(futures::stream::iter(
        frames.into_iter().map(Ok::<_, Infallible>),
    ));

    Ok((headers, body).into_response())
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use query::PipelineError;
use serde_json::json;
use tracing::{error, warn};
use wire::EncodeError;

/// Request failures, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request body: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ApiError::Pipeline(e) if e.is_configuration())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_configuration() {
            error!(error = %self, "Request failed: server is misconfigured");
        } else if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generate::GenerationError;
    use retrieve::RetrievalError;

    #[test]
    fn test_status_mapping() {
        let validation = ApiError::from(PipelineError::Validation("No messages provided".into()));
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(validation.to_string(), "No messages provided");

        let config = ApiError::from(PipelineError::Generation(GenerationError::Configuration(
            "MODEL is not set".into(),
        )));
        assert_eq!(config.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(config.is_configuration());

        let upstream = ApiError::from(PipelineError::Retrieval(RetrievalError::Upstream {
            status: 503,
            body: "down".into(),
        }));
        assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!upstream.is_configuration());

        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
    }
}

pub mod client;
pub mod normalize;

pub use client::{RetrievalConfig, VectorizeClient};

use async_trait::async_trait;
use schema::{ConversationMessage, DiagramRecord, RetrievedDocument};

/// Longest upstream body excerpt kept in errors.
pub const BODY_EXCERPT_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("{0}")]
    Configuration(String),
    #[error("retrieval service responded with {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("retrieval request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected retrieval response: {0}")]
    Decode(String),
}

/// Document and diagram lookup used by the answer pipeline.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve_documents(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<Vec<RetrievedDocument>, RetrievalError>;

    async fn retrieve_diagrams(
        &self,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<DiagramRecord>, RetrievalError>;
}

pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

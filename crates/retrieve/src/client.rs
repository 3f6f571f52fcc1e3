use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::normalize::{normalize_diagrams, normalize_document};
use crate::{RetrievalError, Retriever, excerpt};
use schema::{ConversationMessage, DiagramRecord, RetrievedDocument, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub retrieval_url: String,
    pub token: String,
    pub diagram_url: String,
    pub knowledge_base_domain: String,
    pub num_results: usize,
    pub rerank: bool,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_url: String::new(),
            token: String::new(),
            diagram_url: "http://localhost:8000/retrieve_diagrams".to_string(),
            knowledge_base_domain: "bian.org".to_string(),
            num_results: 5,
            rerank: true,
            timeout_secs: 60,
        }
    }
}

/// Client for the knowledge-base retrieval pipeline and the diagram service.
#[derive(Clone)]
pub struct VectorizeClient {
    config: RetrievalConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RetrievalRequest<'a> {
    question: &'a str,
    #[serde(rename = "numResults")]
    num_results: usize,
    rerank: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<RetrievalContext<'a>>,
}

#[derive(Serialize)]
struct RetrievalContext<'a> {
    messages: Vec<ContextMessage<'a>>,
}

#[derive(Serialize)]
struct ContextMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    documents: Vec<Value>,
}

impl VectorizeClient {
    pub fn new(config: RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    async fn post_json<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<reqwest::Response, RetrievalError> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);

        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RetrievalError::Upstream {
                status,
                body: excerpt(&body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Retriever for VectorizeClient {
    async fn retrieve_documents(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        if self.config.token.trim().is_empty() {
            return Err(RetrievalError::Configuration(
                "VECTORIZE_TOKEN is not set. Add it to the environment before starting the server."
                    .to_string(),
            ));
        }
        if self.config.retrieval_url.trim().is_empty() {
            return Err(RetrievalError::Configuration(
                "VECTORIZE_RETRIEVAL_URL is not set. Define the retrieval pipeline URL in the environment."
                    .to_string(),
            ));
        }

        let context = (!history.is_empty()).then(|| RetrievalContext {
            messages: history
                .iter()
                .map(|m| ContextMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
        });

        let request = RetrievalRequest {
            question: query,
            num_results: self.config.num_results,
            rerank: self.config.rerank,
            context,
        };

        debug!(query, history_turns = history.len(), "Retrieving documents");

        let response = self
            .post_json(&self.config.retrieval_url, &request, Some(&self.config.token))
            .await?;

        let payload: RetrievalResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;

        let documents: Vec<RetrievedDocument> = payload
            .documents
            .iter()
            .enumerate()
            .map(|(i, raw)| normalize_document(raw, i + 1, &self.config.knowledge_base_domain))
            .collect();

        info!(count = documents.len(), "Documents retrieved");
        Ok(documents)
    }

    async fn retrieve_diagrams(
        &self,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<DiagramRecord>, RetrievalError> {
        if self.config.diagram_url.trim().is_empty() {
            return Err(RetrievalError::Configuration(
                "DIAGRAM_API_URL is empty; diagram retrieval is unavailable.".to_string(),
            ));
        }

        let request = RetrievalRequest {
            question: keywords,
            num_results: limit,
            rerank: true,
            context: None,
        };

        let response = self.post_json(&self.config.diagram_url, &request, None).await?;

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        if !is_json {
            let body = response.text().await.unwrap_or_default();
            warn!(body = %excerpt(&body), "Diagram service returned a non-JSON response");
            return Err(RetrievalError::Decode(
                "diagram service returned a non-JSON response".to_string(),
            ));
        }

        let payload: RetrievalResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;

        let mut diagrams = normalize_diagrams(&payload.documents);
        diagrams.truncate(limit);

        info!(keywords, count = diagrams.len(), "Diagrams retrieved");
        Ok(diagrams)
    }
}

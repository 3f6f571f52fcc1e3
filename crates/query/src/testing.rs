//! Scripted collaborators for pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use generate::{GenerateOptions, Generation, GenerationError, Generator};
use retrieve::{RetrievalError, Retriever};
use schema::{ConversationMessage, DiagramRecord, RetrievedDocument};

pub fn reply(text: &str) -> Result<Generation, GenerationError> {
    Ok(Generation {
        text: text.to_string(),
        grounding_metadata: None,
    })
}

pub fn document(title: &str, link: &str) -> RetrievedDocument {
    RetrievedDocument {
        text: format!("Excerpt from {}", title),
        title: title.to_string(),
        link: link.to_string(),
    }
}

pub fn diagram(index: usize, title: &str) -> DiagramRecord {
    DiagramRecord {
        index,
        title: title.to_string(),
        svg_markup: format!("<svg><title>{}</title></svg>", title),
        source_url: format!("https://bian.org/diagrams/{}", index),
    }
}

/// Replies to successive `generate` calls in order and records every prompt.
/// Running past the script yields `GenerationError::Empty`.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<Generation, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<Generation, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<Generation, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::Empty))
    }
}

/// Fixed documents/diagrams, or a fixed upstream status to fail with.
pub struct StaticRetriever {
    documents: Result<Vec<RetrievedDocument>, u16>,
    diagrams: Result<Vec<DiagramRecord>, u16>,
    document_queries: Mutex<Vec<String>>,
    history_lengths: Mutex<Vec<usize>>,
    diagram_keywords: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn with_documents(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            documents: Ok(documents),
            diagrams: Ok(Vec::new()),
            document_queries: Mutex::new(Vec::new()),
            history_lengths: Mutex::new(Vec::new()),
            diagram_keywords: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_documents(status: u16) -> Self {
        Self {
            documents: Err(status),
            ..Self::with_documents(Vec::new())
        }
    }

    pub fn and_diagrams(self, diagrams: Vec<DiagramRecord>) -> Self {
        Self {
            diagrams: Ok(diagrams),
            ..self
        }
    }

    pub fn failing_diagrams(self, status: u16) -> Self {
        Self {
            diagrams: Err(status),
            ..self
        }
    }

    pub fn document_queries(&self) -> Vec<String> {
        self.document_queries.lock().unwrap().clone()
    }

    pub fn history_lengths(&self) -> Vec<usize> {
        self.history_lengths.lock().unwrap().clone()
    }

    pub fn diagram_keywords(&self) -> Vec<String> {
        self.diagram_keywords.lock().unwrap().clone()
    }

    pub fn diagram_calls(&self) -> usize {
        self.diagram_keywords.lock().unwrap().len()
    }
}

fn upstream(status: u16) -> RetrievalError {
    RetrievalError::Upstream {
        status,
        body: "scripted failure".to_string(),
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve_documents(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        self.document_queries.lock().unwrap().push(query.to_string());
        self.history_lengths.lock().unwrap().push(history.len());
        self.documents.clone().map_err(upstream)
    }

    async fn retrieve_diagrams(
        &self,
        keywords: &str,
        limit: usize,
    ) -> Result<Vec<DiagramRecord>, RetrievalError> {
        self.diagram_keywords.lock().unwrap().push(keywords.to_string());
        self.diagrams
            .clone()
            .map(|mut d| {
                d.truncate(limit);
                d
            })
            .map_err(upstream)
    }
}

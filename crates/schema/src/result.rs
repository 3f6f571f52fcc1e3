use serde::{Deserialize, Serialize};

use crate::document::DiagramRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    KnowledgeBase,
    Web,
}

/// One numbered line of the references section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceEntry {
    pub number: usize,
    pub title: String,
    pub link: String,
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

/// What happened during one pipeline run, for logs and metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineTrace {
    pub rewritten_query: Option<String>,
    pub documents_retrieved: usize,
    pub diagram_keywords: Option<String>,
    pub diagrams_retrieved: usize,
    pub refined: bool,
    pub fallbacks: Vec<String>,
    pub timings: Vec<StageTiming>,
}

/// The composed answer handed to the stream encoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub answer_text: String,
    pub references: Vec<ReferenceEntry>,
    pub diagrams: Vec<DiagramRecord>,
    #[serde(default)]
    pub trace: PipelineTrace,
}

impl PipelineResult {
    pub fn has_diagrams(&self) -> bool {
        !self.diagrams.is_empty()
    }
}

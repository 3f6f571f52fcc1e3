pub mod prompt;
pub mod classify;
pub mod references;
pub mod outcome;
pub mod pipeline;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use classify::{DiagramDecision, ParseError, parse_decision};
pub use outcome::{Stage, StageOutcome};
pub use pipeline::{AnswerPipeline, PipelineMode, PipelineOptions};

use generate::GenerationError;
use retrieve::RetrievalError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl PipelineError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::Retrieval(RetrievalError::Configuration(_))
                | PipelineError::Generation(GenerationError::Configuration(_))
        )
    }
}

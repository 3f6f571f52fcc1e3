use std::fmt;

use schema::PipelineTrace;
use tracing::warn;

use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rewriting,
    Retrieving,
    Drafting,
    Classifying,
    DiagramRetrieval,
    Refining,
    Assembling,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Rewriting => "rewriting",
            Stage::Retrieving => "retrieving",
            Stage::Drafting => "drafting",
            Stage::Classifying => "classifying",
            Stage::DiagramRetrieval => "diagram_retrieval",
            Stage::Refining => "refining",
            Stage::Assembling => "assembling",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Ok(T),
    Fallback { value: T, reason: String },
    Fatal(PipelineError),
}

impl<T> StageOutcome<T> {
    /// A stage the answer cannot do without: any error is fatal.
    pub fn required<E>(result: Result<T, E>) -> Self
    where
        E: Into<PipelineError>,
    {
        match result {
            Ok(value) => StageOutcome::Ok(value),
            Err(e) => StageOutcome::Fatal(e.into()),
        }
    }

    /// A stage with a safe default: errors degrade to `fallback()`.
    pub fn advisory<E, F>(result: Result<T, E>, fallback: F) -> Self
    where
        E: fmt::Display,
        F: FnOnce() -> T,
    {
        match result {
            Ok(value) => StageOutcome::Ok(value),
            Err(e) => StageOutcome::Fallback {
                value: fallback(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, StageOutcome::Fallback { .. })
    }

    /// Unwrap into the stage value, recording fallbacks in the trace.
    pub fn resolve(self, stage: Stage, trace: &mut PipelineTrace) -> Result<T, PipelineError> {
        match self {
            StageOutcome::Ok(value) => Ok(value),
            StageOutcome::Fallback { value, reason } => {
                warn!(stage = %stage, reason = %reason, "Stage fell back to default");
                trace.fallbacks.push(stage.as_str().to_string());
                Ok(value)
            }
            StageOutcome::Fatal(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_records_fallback() {
        let mut trace = PipelineTrace::default();
        let outcome = StageOutcome::advisory(Err::<String, _>("timeout"), || "original".to_string());
        assert!(outcome.is_fallback());

        let value = outcome.resolve(Stage::Rewriting, &mut trace).unwrap();
        assert_eq!(value, "original");
        assert_eq!(trace.fallbacks, vec!["rewriting"]);
    }

    #[test]
    fn test_required_is_fatal() {
        let mut trace = PipelineTrace::default();
        let outcome = StageOutcome::<()>::required(Err(PipelineError::Validation("bad".into())));
        assert!(outcome.resolve(Stage::Retrieving, &mut trace).is_err());
        assert!(trace.fallbacks.is_empty());
    }
}

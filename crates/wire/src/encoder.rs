use schema::{DiagramRecord, PipelineResult};
use serde::Serialize;

use crate::{DIAGRAMS_END, DIAGRAMS_START, TEXT_FRAME_PREFIX};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize stream frame: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct DiagramPayload<'a> {
    diagrams: &'a [DiagramRecord],
}

/// `0:"<escaped>"\n`. JSON string escaping covers quotes, backslashes and
/// control characters, so prose can never close the frame early.
pub fn encode_text_frame(text: &str) -> Result<String, EncodeError> {
    Ok(format!("{}{}\n", TEXT_FRAME_PREFIX, serde_json::to_string(text)?))
}

pub fn encode_diagram_frame(diagrams: &[DiagramRecord]) -> Result<String, EncodeError> {
    let payload = serde_json::to_string(&DiagramPayload { diagrams })?;
    Ok(format!("{}\n{}\n{}\n", DIAGRAMS_START, payload, DIAGRAMS_END))
}

/// Frames for one pipeline result: the full text, then diagrams if any.
pub fn encode_frames(result: &PipelineResult) -> Vec<Result<String, EncodeError>> {
    let mut frames = vec![encode_text_frame(&result.answer_text)];
    if result.has_diagrams() {
        frames.push(encode_diagram_frame(&result.diagrams));
    }
    frames
}

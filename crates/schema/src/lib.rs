pub mod message;
pub mod document;
pub mod grounding;
pub mod result;
pub mod markers;

pub use message::{ConversationMessage, Role};
pub use document::{DiagramRecord, RetrievedDocument};
pub use grounding::{GroundingChunk, GroundingMetadata, GroundingSupport, SearchEntryPoint, WebSource};
pub use result::{PipelineResult, PipelineTrace, ReferenceEntry, ReferenceKind, StageTiming};
pub use markers::{AnswerDocument, Marker, MarkerSpan};

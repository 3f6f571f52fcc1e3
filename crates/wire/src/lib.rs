//! The chat response wire format.
//!
//! ```text
//! 0:"<json-escaped answer text>"\n
//! diagrams-start\n
//! {"diagrams":[{"index":1,"title":"...","svg_content":"...","source_url":"..."}]}
//! \ndiagrams-end\n
//! ```
//!
//! The diagram block is optional. Text frames may repeat; the decoder appends
//! them in arrival order.

pub mod encoder;
pub mod decoder;
pub mod segments;

pub use encoder::{EncodeError, encode_frames, encode_text_frame, encode_diagram_frame};
pub use decoder::{DecodeError, DiagramDocument, StreamDecoder, StreamParserState, process_stream};
pub use segments::{ContentSegment, parse_segments};

pub const TEXT_FRAME_PREFIX: &str = "0:";
pub const DIAGRAMS_START: &str = "diagrams-start";
pub const DIAGRAMS_END: &str = "diagrams-end";

/// Response header marking the custom framing.
pub const STREAM_DATA_HEADER: &str = "x-experimental-stream-data";
pub const HAS_DIAGRAMS_HEADER: &str = "x-has-diagrams";
pub const DIAGRAM_COUNT_HEADER: &str = "x-diagram-count";

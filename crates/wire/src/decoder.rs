//! Client-side incremental decoder for the chat stream.
//!
//! Bytes are buffered until a full line is available, so frames and markers
//! split across chunks (even mid-character or mid-marker) decode the same as
//! if they had arrived in one piece.

use std::error::Error as StdError;
use std::pin::pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{DIAGRAMS_END, DIAGRAMS_START, TEXT_FRAME_PREFIX};

/// A diagram as seen by the client, with field names unified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramDocument {
    pub index: usize,
    pub title: String,
    pub svg_content: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamParserState {
    pub text: String,
    pub diagrams: Vec<DiagramDocument>,
    pub is_complete: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("stream read failed: {source}")]
    Transport {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
        /// Whatever had been decoded before the failure.
        partial: Box<StreamParserState>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Diagrams,
}

#[derive(Debug)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    mode: Mode,
    diagram_json: String,
    state: StreamParserState,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            mode: Mode::Text,
            diagram_json: String::new(),
            state: StreamParserState::default(),
        }
    }

    pub fn state(&self) -> &StreamParserState {
        &self.state
    }

    pub fn into_state(self) -> StreamParserState {
        self.state
    }

    /// Consume one chunk. Returns true when the visible state changed.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.state.is_complete {
            return false;
        }
        self.pending.extend_from_slice(chunk);

        let mut changed = false;
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            changed |= self.process_line(&line, true);
        }
        changed
    }

    /// End of stream: flush the last partial line and any diagram JSON still
    /// waiting for its end marker. Completes the state exactly once.
    pub fn finish(&mut self) -> bool {
        if self.state.is_complete {
            return false;
        }

        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(&line, false);
        }

        if self.mode == Mode::Diagrams {
            debug!(bytes = self.diagram_json.len(), "Finalizing diagram data at end of stream");
            self.apply_diagrams();
            self.mode = Mode::Text;
        }

        self.state.is_complete = true;
        true
    }

    /// Mark the stream as finished after a transport failure.
    pub fn fail(&mut self) {
        self.pending.clear();
        self.state.is_complete = true;
    }

    // Markers only count when they fill the whole line; payloads may mention them.
    fn process_line(&mut self, line: &str, terminated: bool) -> bool {
        let line = line.strip_suffix('\r').unwrap_or(line);

        match self.mode {
            Mode::Diagrams => {
                if line.trim() == DIAGRAMS_END {
                    self.mode = Mode::Text;
                    return self.apply_diagrams();
                }
                self.diagram_json.push_str(line);
                self.diagram_json.push('\n');
                false
            }
            Mode::Text => {
                if line.trim() == DIAGRAMS_START {
                    self.mode = Mode::Diagrams;
                    self.diagram_json.clear();
                    return false;
                }

                if let Some(payload) = line.strip_prefix(TEXT_FRAME_PREFIX) {
                    let text = decode_text_payload(payload);
                    self.state.text.push_str(&text);
                    return !text.is_empty();
                }

                self.append_raw(line, terminated)
            }
        }
    }

    // Lines outside any frame are kept as plain text.
    fn append_raw(&mut self, line: &str, terminated: bool) -> bool {
        self.state.text.push_str(line);
        if terminated {
            self.state.text.push('\n');
        }
        !line.is_empty() || terminated
    }

    fn apply_diagrams(&mut self) -> bool {
        let raw = std::mem::take(&mut self.diagram_json);
        match parse_diagram_payload(&raw) {
            Ok(diagrams) => {
                debug!(count = diagrams.len(), "Parsed diagram frame");
                self.state.diagrams = diagrams;
                true
            }
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "Discarding unparseable diagram frame");
                false
            }
        }
    }
}

/// Decode a text frame body. Complete frames are JSON strings; a truncated
/// one is salvaged by unescaping quotes and backslashes by hand.
fn decode_text_payload(payload: &str) -> String {
    let payload = payload.trim_end();
    if let Ok(text) = serde_json::from_str::<String>(payload) {
        return text;
    }

    let inner = payload.strip_prefix('"').unwrap_or(payload);
    let inner = inner.strip_suffix('"').unwrap_or(inner);
    inner.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Trim to the outermost `{...}` before parsing.
fn sanitize_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn parse_diagram_payload(raw: &str) -> Result<Vec<DiagramDocument>, serde_json::Error> {
    let payload: Value = serde_json::from_str(sanitize_json(raw))?;

    let diagrams = payload
        .get("diagrams")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .enumerate()
                .map(|(i, raw)| normalize_diagram(raw, i + 1))
                .collect()
        })
        .unwrap_or_default();

    Ok(diagrams)
}

fn normalize_diagram(raw: &Value, index: usize) -> DiagramDocument {
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| raw.get(*name).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_string)
    };

    DiagramDocument {
        index,
        title: field(&["title", "source_display_name", "filename"])
            .unwrap_or_else(|| format!("BIAN Diagram {}", index)),
        svg_content: field(&["svg_content", "svg"]).unwrap_or_default(),
        source_url: field(&["source_url", "url"]).unwrap_or_default(),
    }
}

/// Drive a decoder over a byte stream, calling `on_update` after every state
/// change. The stream is dropped on every exit path.
pub async fn process_stream<S, B, E, F>(
    stream: S,
    mut on_update: F,
) -> Result<StreamParserState, DecodeError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: StdError + Send + Sync + 'static,
    F: FnMut(&StreamParserState),
{
    let mut stream = pin!(stream);
    let mut decoder = StreamDecoder::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if decoder.feed(chunk.as_ref()) {
                    on_update(decoder.state());
                }
            }
            Err(e) => {
                warn!(error = %e, "Stream read failed");
                decoder.fail();
                on_update(decoder.state());
                return Err(DecodeError::Transport {
                    source: Box::new(e),
                    partial: Box::new(decoder.into_state()),
                });
            }
        }
    }

    decoder.finish();
    on_update(decoder.state());
    Ok(decoder.into_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_frames;
    use schema::{DiagramRecord, PipelineResult};

    fn result(text: &str, diagrams: Vec<DiagramRecord>) -> PipelineResult {
        PipelineResult {
            answer_text: text.to_string(),
            references: vec![],
            diagrams,
            trace: Default::default(),
        }
    }

    fn record(index: usize) -> DiagramRecord {
        DiagramRecord {
            index,
            title: format!("Diagram {}", index),
            svg_markup: format!("<svg id=\"d{}\">\n<text>é</text></svg>", index),
            source_url: format!("https://bian.org/d/{}", index),
        }
    }

    fn encoded(result: &PipelineResult) -> Vec<u8> {
        encode_frames(result)
            .into_iter()
            .map(|f| f.unwrap())
            .collect::<String>()
            .into_bytes()
    }

    fn decode_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> StreamParserState {
        let mut decoder = StreamDecoder::new();
        for chunk in chunks {
            decoder.feed(chunk);
        }
        decoder.finish();
        decoder.into_state()
    }

    const TRICKY: &str = "Quote \"here\", backslash \\ and\nnew lines. 服务域 [See Diagram 1: A]";

    #[test]
    fn test_round_trip() {
        let original = result(TRICKY, vec![record(1), record(2)]);
        let state = decode_chunks([encoded(&original).as_slice()]);

        assert_eq!(state.text, TRICKY);
        assert!(state.is_complete);
        assert_eq!(state.diagrams.len(), 2);
        for (decoded, source) in state.diagrams.iter().zip(&original.diagrams) {
            assert_eq!(decoded.index, source.index);
            assert_eq!(decoded.svg_content, source.svg_markup);
            assert_eq!(decoded.source_url, source.source_url);
            assert_eq!(decoded.title, source.title);
        }
    }

    #[test]
    fn test_single_byte_chunks_match_whole_stream() {
        let bytes = encoded(&result(TRICKY, vec![record(1)]));

        let whole = decode_chunks([bytes.as_slice()]);
        let split = decode_chunks(bytes.chunks(1));
        assert_eq!(whole, split);
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let bytes = encoded(&result("text", vec![record(1)]));
        let text = String::from_utf8(bytes.clone()).unwrap();
        let cut = text.find("diagrams-end").unwrap() + 4;

        let state = decode_chunks([&bytes[..cut], &bytes[cut..]]);
        assert_eq!(state.text, "text");
        assert_eq!(state.diagrams.len(), 1);
    }

    #[test]
    fn test_garbage_around_diagram_json_is_trimmed() {
        let stream = "0:\"hi\"\ndiagrams-start\nnoise {\"diagrams\":[{\"svg\":\"<svg/>\",\"url\":\"https://x\"}]} trailing\ndiagrams-end\n";
        let state = decode_chunks([stream.as_bytes()]);

        assert_eq!(state.diagrams.len(), 1);
        assert_eq!(state.diagrams[0].svg_content, "<svg/>");
        assert_eq!(state.diagrams[0].source_url, "https://x");
        assert_eq!(state.diagrams[0].title, "BIAN Diagram 1");
    }

    #[test]
    fn test_marker_text_inside_payload_round_trips() {
        let mut tricky = record(1);
        tricky.svg_markup = "<svg><text>diagrams-end</text></svg>".to_string();
        tricky.title = "diagrams-start".to_string();
        let original = result("answer mentions diagrams-end too", vec![tricky]);

        let state = decode_chunks([encoded(&original).as_slice()]);

        assert_eq!(state.text, "answer mentions diagrams-end too");
        assert_eq!(state.diagrams.len(), 1);
        assert_eq!(state.diagrams[0].svg_content, "<svg><text>diagrams-end</text></svg>");
        assert_eq!(state.diagrams[0].title, "diagrams-start");
    }

    #[test]
    fn test_malformed_diagram_json_keeps_decoding() {
        let stream = "0:\"first\"\ndiagrams-start\n{\"diagrams\": [ {\"svg\": \ndiagrams-end\n0:\" second\"\n";
        let state = decode_chunks([stream.as_bytes()]);

        assert_eq!(state.text, "first second");
        assert!(state.diagrams.is_empty());
        assert!(state.is_complete);
    }

    #[test]
    fn test_unterminated_diagram_block_is_finalized() {
        let stream = "0:\"t\"\ndiagrams-start\n{\"diagrams\":[{\"svg_content\":\"<svg/>\",\"source_url\":\"u\"}]}";
        let state = decode_chunks([stream.as_bytes()]);

        assert_eq!(state.diagrams.len(), 1);
        assert!(state.is_complete);
    }

    #[test]
    fn test_indices_are_reassigned_by_position() {
        let stream = "diagrams-start\n{\"diagrams\":[{\"index\":7,\"svg\":\"a\"},{\"index\":3,\"svg\":\"b\"}]}\ndiagrams-end\n";
        let state = decode_chunks([stream.as_bytes()]);
        let indices: Vec<_> = state.diagrams.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_truncated_text_frame_is_salvaged() {
        let state = decode_chunks([b"0:\"cut \\\"short".as_slice()]);
        assert_eq!(state.text, "cut \"short");
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(b"0:\"x\"\n");
        assert!(decoder.finish());
        assert!(!decoder.finish());
        assert!(!decoder.feed(b"0:\"more\"\n"));
        assert_eq!(decoder.state().text, "x");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    #[tokio::test]
    async fn test_process_stream_reports_updates() {
        let bytes = encoded(&result("streamed", vec![record(1)]));
        let chunks: Vec<Result<Vec<u8>, Reset>> = bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();

        let mut updates = Vec::new();
        let state = process_stream(futures::stream::iter(chunks), |s| updates.push(s.clone()))
            .await
            .unwrap();

        assert_eq!(state.text, "streamed");
        assert_eq!(state.diagrams.len(), 1);
        assert!(state.is_complete);
        assert_eq!(updates.iter().filter(|s| s.is_complete).count(), 1);
        assert!(updates.last().unwrap().is_complete);
        assert!(updates.iter().all(|s| s.text.len() <= state.text.len()));
    }

    #[tokio::test]
    async fn test_transport_error_completes_and_propagates() {
        let chunks: Vec<Result<Vec<u8>, Reset>> = vec![Ok(b"0:\"partial\"\n".to_vec()), Err(Reset)];

        let mut last = None;
        let err = process_stream(futures::stream::iter(chunks), |s| last = Some(s.clone()))
            .await
            .unwrap_err();

        let last = last.unwrap();
        assert!(last.is_complete);
        assert_eq!(last.text, "partial");
        let DecodeError::Transport { partial, .. } = err;
        assert_eq!(partial.text, "partial");
    }
}

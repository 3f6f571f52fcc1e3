//! Text extraction from provider responses.
//!
//! Providers (and provider versions) put the generated text in different
//! places. Each strategy looks in one place and the first one that yields
//! non-blank text wins.

use schema::GroundingMetadata;
use serde_json::Value;
use tracing::debug;

use crate::{GenerationError, Generation};

type Strategy = fn(&Value) -> Option<String>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("candidate_parts", candidate_parts),
    ("response_text", response_text),
    ("candidate_text", candidate_text),
    ("raw_string", raw_string),
    ("stringified", stringified),
];

/// Keys that mark a known provider envelope. A response carrying one of
/// these with no usable text is empty, not something to stringify.
const ENVELOPE_KEYS: &[&str] = &["candidates", "response", "text", "content"];

pub fn extract_text(response: &Value) -> Option<(String, &'static str)> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        strategy(response)
            .filter(|text| !text.trim().is_empty())
            .map(|text| (text, *name))
    })
}

/// Grounding metadata from the first candidate, if any is present.
pub fn extract_grounding(response: &Value) -> Option<GroundingMetadata> {
    let raw = first_candidate(response)?.get("groundingMetadata")?;
    serde_json::from_value::<GroundingMetadata>(raw.clone())
        .ok()
        .filter(|m| !m.is_empty())
}

pub fn into_generation(response: &Value) -> Result<Generation, GenerationError> {
    let (text, strategy) = extract_text(response).ok_or(GenerationError::Empty)?;
    debug!(strategy, chars = text.len(), "Extracted generation text");

    Ok(Generation {
        text,
        grounding_metadata: extract_grounding(response),
    })
}

fn first_candidate(response: &Value) -> Option<&Value> {
    response.get("candidates")?.as_array()?.first()
}

fn candidate_parts(response: &Value) -> Option<String> {
    let parts = first_candidate(response)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let joined: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .filter(|t| !t.is_empty())
        .collect();

    Some(joined)
}

fn response_text(response: &Value) -> Option<String> {
    ["text", "response"]
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn candidate_text(response: &Value) -> Option<String> {
    let candidate = first_candidate(response).or_else(|| response.get("content"))?;
    candidate
        .get("content")
        .and_then(|c| c.get("text"))
        .or_else(|| candidate.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn raw_string(response: &Value) -> Option<String> {
    response.as_str().map(str::to_string)
}

fn stringified(response: &Value) -> Option<String> {
    match response {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Object(map) if ENVELOPE_KEYS.iter().any(|k| map.contains_key(*k)) => None,
        Value::Array(items) if items.is_empty() => None,
        other => serde_json::to_string(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_parts_are_joined_skipping_empty() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "A Service " }, { "text": "" }, { "inlineData": {} }, { "text": "Domain" }] }
            }]
        });

        let (text, strategy) = extract_text(&response).unwrap();
        assert_eq!(text, "A Service Domain");
        assert_eq!(strategy, "candidate_parts");
    }

    #[test]
    fn test_top_level_text_accessor() {
        let (text, strategy) = extract_text(&json!({ "text": "hello" })).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(strategy, "response_text");
    }

    #[test]
    fn test_ollama_response_field() {
        let (text, _) = extract_text(&json!({ "model": "llama3", "response": "hi", "done": true })).unwrap();
        assert_eq!(text, "hi");
    }

    #[test]
    fn test_candidate_text_when_parts_blank() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "  " }] }, "text": "fallback" }]
        });

        let (text, strategy) = extract_text(&response).unwrap();
        assert_eq!(text, "fallback");
        assert_eq!(strategy, "candidate_text");
    }

    #[test]
    fn test_raw_string() {
        let (text, strategy) = extract_text(&json!("plain")).unwrap();
        assert_eq!(text, "plain");
        assert_eq!(strategy, "raw_string");
    }

    #[test]
    fn test_unknown_shape_is_stringified() {
        let (text, strategy) = extract_text(&json!({ "answer": 42 })).unwrap();
        assert_eq!(text, r#"{"answer":42}"#);
        assert_eq!(strategy, "stringified");
    }

    #[test]
    fn test_blank_envelope_is_empty_generation() {
        let response = json!({ "candidates": [{ "content": { "parts": [{ "text": "   " }] }, "finishReason": "SAFETY" }] });
        assert!(matches!(into_generation(&response), Err(GenerationError::Empty)));
        assert!(matches!(into_generation(&Value::Null), Err(GenerationError::Empty)));
    }

    #[test]
    fn test_grounding_is_optional() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "answer" }] },
                "groundingMetadata": {
                    "groundingChunks": [{ "web": { "uri": "https://bian.org", "title": "BIAN" } }],
                    "webSearchQueries": ["bian"]
                }
            }]
        });

        let generation = into_generation(&response).unwrap();
        let grounding = generation.grounding_metadata.unwrap();
        assert_eq!(grounding.grounding_chunks.len(), 1);
        assert_eq!(grounding.web_search_queries, vec!["bian"]);

        let bare = json!({ "candidates": [{ "content": { "parts": [{ "text": "answer" }] } }] });
        assert!(into_generation(&bare).unwrap().grounding_metadata.is_none());
    }
}

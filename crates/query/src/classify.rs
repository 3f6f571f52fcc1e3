use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("classification response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whether the answer should be illustrated, and what to search for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagramDecision {
    pub need_diagram: bool,
    pub keywords: String,
}

impl DiagramDecision {
    /// Diagram retrieval only runs with a positive decision and something to
    /// search for.
    pub fn wants_diagrams(&self) -> bool {
        self.need_diagram && !self.keywords.trim().is_empty()
    }
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(rename = "needDiagram", alias = "need_diagram", default)]
    need_diagram: bool,
    #[serde(default)]
    keywords: Option<Keywords>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Keywords {
    Joined(String),
    List(Vec<String>),
}

pub fn parse_decision(raw: &str) -> Result<DiagramDecision, ParseError> {
    let body = strip_code_fence(raw);
    let decision: RawDecision = serde_json::from_str(body)?;

    let keywords = match decision.keywords {
        Some(Keywords::Joined(s)) => s.trim().to_string(),
        Some(Keywords::List(list)) => list
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        None => String::new(),
    };

    Ok(DiagramDecision {
        need_diagram: decision.need_diagram,
        keywords,
    })
}

/// Remove a surrounding ```json ... ``` fence if the model added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

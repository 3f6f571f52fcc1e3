//! Inline markers inside generated answers.
//!
//! Two kinds of spans are recognized: the `[source=N&link=URL]` tags attached
//! to retrieved documents in the drafting prompt (which models tend to echo
//! back as citations), and `[See Diagram N: Title]` references inserted
//! during refinement. Substitution is a lookup over parsed spans instead of
//! repeated regex surgery on the raw text.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[source=(\d+)&link=([^\]\s]+)\]").expect("citation pattern is valid")
});

static DIAGRAM_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[See Diagram (\d+):\s*([^\[\]]+)\]").expect("diagram pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Citation { source: usize, link: String },
    Diagram { index: usize, title: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpan {
    pub range: Range<usize>,
    pub marker: Marker,
}

/// Answer text plus the marker spans found in it, ordered by position.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerDocument {
    text: String,
    spans: Vec<MarkerSpan>,
}

impl AnswerDocument {
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut spans = Vec::new();

        for caps in CITATION.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            if let Ok(source) = caps[1].parse::<usize>() {
                spans.push(MarkerSpan {
                    range: whole.range(),
                    marker: Marker::Citation {
                        source,
                        link: caps[2].to_string(),
                    },
                });
            }
        }

        for caps in DIAGRAM_REF.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            if let Ok(index) = caps[1].parse::<usize>() {
                spans.push(MarkerSpan {
                    range: whole.range(),
                    marker: Marker::Diagram {
                        index,
                        title: caps[2].trim().to_string(),
                    },
                });
            }
        }

        spans.sort_by_key(|s| s.range.start);

        // The two passes can overlap; the earlier span wins.
        let mut end = 0;
        spans.retain(|s| {
            let keep = s.range.start >= end;
            if keep {
                end = s.range.end;
            }
            keep
        });

        Self { text, spans }
    }

    pub fn spans(&self) -> &[MarkerSpan] {
        &self.spans
    }

    pub fn diagram_indices(&self) -> Vec<usize> {
        self.spans
            .iter()
            .filter_map(|s| match s.marker {
                Marker::Diagram { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    /// Rebuild the text, asking `replace` what each marker becomes.
    /// `None` keeps the marker text as it was.
    pub fn render_with<F>(&self, mut replace: F) -> String
    where
        F: FnMut(&Marker) -> Option<String>,
    {
        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;

        for span in &self.spans {
            out.push_str(&self.text[cursor..span.range.start]);
            match replace(&span.marker) {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(&self.text[span.range.clone()]),
            }
            cursor = span.range.end;
        }

        out.push_str(&self.text[cursor..]);
        out
    }
}

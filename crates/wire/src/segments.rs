use schema::{AnswerDocument, Marker};
use tracing::warn;

use crate::decoder::DiagramDocument;

/// A renderable piece of a decoded answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSegment {
    Text(String),
    Diagram { index: usize, diagram: DiagramDocument },
}

/// Split answer text on `[See Diagram N: Title]` markers, resolving each one
/// against the decoded diagrams. Markers naming a diagram that never arrived
/// are dropped; citation markers stay in the surrounding text.
pub fn parse_segments(text: &str, diagrams: &[DiagramDocument]) -> Vec<ContentSegment> {
    let doc = AnswerDocument::parse(text);
    let mut segments = Vec::new();
    let mut cursor = 0;

    for span in doc.spans() {
        let Marker::Diagram { index, title } = &span.marker else {
            continue;
        };

        push_text(&mut segments, &text[cursor..span.range.start]);
        cursor = span.range.end;

        match diagrams.iter().find(|d| d.index == *index) {
            Some(diagram) => segments.push(ContentSegment::Diagram {
                index: *index,
                diagram: diagram.clone(),
            }),
            None => warn!(index, title = %title, "Answer references a diagram that was not delivered"),
        }
    }

    push_text(&mut segments, &text[cursor..]);
    segments
}

fn push_text(segments: &mut Vec<ContentSegment>, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    // Neighbouring text pieces merge when a dropped marker separated them.
    if let Some(ContentSegment::Text(previous)) = segments.last_mut() {
        previous.push_str(text);
    } else {
        segments.push(ContentSegment::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagram(index: usize) -> DiagramDocument {
        DiagramDocument {
            index,
            title: format!("D{}", index),
            svg_content: "<svg/>".into(),
            source_url: String::new(),
        }
    }

    #[test]
    fn test_text_and_diagrams_interleave() {
        let segments = parse_segments(
            "Intro.\n[See Diagram 1: Payments]\nMiddle [See Diagram 2: Loans] end.",
            &[diagram(1), diagram(2)],
        );

        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0], ContentSegment::Text("Intro.\n".into()));
        assert!(matches!(&segments[1], ContentSegment::Diagram { index: 1, .. }));
        assert_eq!(segments[2], ContentSegment::Text("\nMiddle ".into()));
        assert!(matches!(&segments[3], ContentSegment::Diagram { index: 2, .. }));
        assert_eq!(segments[4], ContentSegment::Text(" end.".into()));
    }

    #[test]
    fn test_unknown_diagram_is_dropped() {
        let segments = parse_segments("Before [See Diagram 5: Missing] after", &[diagram(1)]);
        assert_eq!(segments, vec![ContentSegment::Text("Before  after".into())]);
    }

    #[test]
    fn test_whitespace_only_text_is_filtered() {
        let segments = parse_segments("  [See Diagram 1: A]  \n", &[diagram(1)]);
        assert_eq!(segments.len(), 1);
        assert!(matches!(&segments[0], ContentSegment::Diagram { index: 1, diagram } if diagram.title == "D1"));
    }

    #[test]
    fn test_citations_stay_in_text() {
        let text = "See [source=1&link=https://bian.org/a] for details";
        let segments = parse_segments(text, &[]);
        assert_eq!(segments, vec![ContentSegment::Text(text.into())]);
    }
}

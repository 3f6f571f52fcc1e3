//! The references section appended to every answer.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use schema::{
    AnswerDocument, GroundingMetadata, Marker, ReferenceEntry, ReferenceKind, RetrievedDocument,
};

const WEB_TITLE_FALLBACK: &str = "Web Resource";
const PLACEHOLDER_TOKENS: &[&str] = &["undefined", "null", "{{", "}}", "[object", "..."];

/// A diagram list the model appended on its own, anchored to the end of text.
static TRAILING_DIAGRAM_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\n+(?:-{3,}[ \t]*\n+)?#{1,6}[ \t]*(?:diagram references?|referenced diagrams|related diagrams|diagrams)[ \t]*:?[ \t]*\n(?:[ \t]*(?:[-*]|\d+\.)?[ \t]*\[?(?:see )?diagram[ \t]+\d+[^\n]*(?:\n|\z))*\s*\z",
    )
    .expect("trailing diagram pattern is valid")
});

/// Rendered answer plus the numbered entries it references.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledAnswer {
    pub text: String,
    pub references: Vec<ReferenceEntry>,
}

pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    without_fragment.trim_end_matches('/').to_lowercase()
}

pub fn strip_trailing_diagram_section(text: &str) -> &str {
    match TRAILING_DIAGRAM_SECTION.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

/// Number knowledge-base documents then web sources, one continuous sequence,
/// dropping repeated links within each group.
pub fn build_references(
    documents: &[RetrievedDocument],
    grounding: Option<&GroundingMetadata>,
) -> Vec<ReferenceEntry> {
    let mut entries = Vec::new();

    let mut seen = HashSet::new();
    for doc in documents {
        if seen.insert(normalize_url(&doc.link)) {
            entries.push(ReferenceEntry {
                number: entries.len() + 1,
                title: doc.title.clone(),
                link: doc.link.clone(),
                kind: ReferenceKind::KnowledgeBase,
            });
        }
    }

    let mut seen = HashSet::new();
    let chunks = grounding.map(|g| g.grounding_chunks.as_slice()).unwrap_or_default();
    for web in chunks.iter().filter_map(|c| c.web.as_ref()) {
        let Some(uri) = web.uri.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        if seen.insert(normalize_url(uri)) {
            entries.push(ReferenceEntry {
                number: entries.len() + 1,
                title: web
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(WEB_TITLE_FALLBACK)
                    .to_string(),
                link: uri.to_string(),
                kind: ReferenceKind::Web,
            });
        }
    }

    entries
}

/// Distinct, non-trivial web search queries, in first-seen order.
pub fn search_topics(grounding: Option<&GroundingMetadata>) -> Vec<String> {
    let mut seen = HashSet::new();
    grounding
        .map(|g| g.web_search_queries.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|q| q.trim())
        .filter(|q| q.chars().count() > 3)
        .filter(|q| {
            let lower = q.to_lowercase();
            !PLACEHOLDER_TOKENS.iter().any(|token| lower.contains(token))
        })
        .filter(|q| seen.insert(q.to_lowercase()))
        .map(str::to_string)
        .collect()
}

pub fn render_references(entries: &[ReferenceEntry], topics: &[String]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\n---\n### References\n");

    let groups = [
        (ReferenceKind::KnowledgeBase, "#### Knowledge Base"),
        (ReferenceKind::Web, "#### Web Resources"),
    ];
    for (kind, heading) in groups {
        let group: Vec<_> = entries.iter().filter(|e| e.kind == kind).collect();
        if group.is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str(heading);
        out.push('\n');
        for entry in group {
            out.push_str(&format!("- [{}] {} <{}>\n", entry.number, entry.title, entry.link));
        }
    }

    if !topics.is_empty() {
        out.push_str("\n#### Related Search Topics\n");
        for topic in topics {
            out.push_str(&format!("- {}\n", topic));
        }
    }

    out
}

/// Replace echoed `[source=N&link=...]` tags with the matching reference
/// number. Tags that match nothing are dropped.
pub fn resolve_citations(
    text: &str,
    documents: &[RetrievedDocument],
    entries: &[ReferenceEntry],
) -> String {
    let by_link: HashMap<String, usize> = entries
        .iter()
        .filter(|e| e.kind == ReferenceKind::KnowledgeBase)
        .map(|e| (normalize_url(&e.link), e.number))
        .collect();

    AnswerDocument::parse(text).render_with(|marker| match marker {
        Marker::Citation { source, link } => {
            let number = source
                .checked_sub(1)
                .and_then(|i| documents.get(i))
                .and_then(|doc| by_link.get(&normalize_url(&doc.link)))
                .or_else(|| by_link.get(&normalize_url(link)));
            Some(number.map(|n| format!("[{}]", n)).unwrap_or_default())
        }
        Marker::Diagram { .. } => None,
    })
}

pub fn assemble(
    answer: &str,
    documents: &[RetrievedDocument],
    grounding: Option<&GroundingMetadata>,
) -> AssembledAnswer {
    let body = strip_trailing_diagram_section(answer);
    let references = build_references(documents, grounding);
    let body = resolve_citations(body, documents, &references);

    let mut text = body.trim_end().to_string();
    text.push_str(&render_references(&references, &search_topics(grounding)));

    AssembledAnswer { text, references }
}

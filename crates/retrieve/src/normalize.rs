//! Turns loosely-shaped retrieval payloads into fixed records.
//!
//! Providers disagree on field names, so every field is read through an
//! ordered list of candidates and the first non-empty string wins.

use schema::{DiagramRecord, RetrievedDocument};
use serde_json::Value;

const TEXT_FIELDS: &[&str] = &["text", "content", "chunk", "page_content"];
const LINK_FIELDS: &[&str] = &["url", "link", "source_url", "source"];
const METADATA_LINK_FIELDS: &[&str] = &["url", "source_url", "link", "source"];
const DISPLAY_NAME_FIELDS: &[&str] = &["source_display_name", "display_name", "title"];
const FILENAME_FIELDS: &[&str] = &["filename", "file_name", "name"];

const SVG_FIELDS: &[&str] = &["svg_content", "svg"];
const DIAGRAM_URL_FIELDS: &[&str] = &["source_url", "url"];

pub fn normalize_document(raw: &Value, ordinal: usize, kb_domain: &str) -> RetrievedDocument {
    let text = first_string(raw, TEXT_FIELDS).unwrap_or_default();
    let display_name = first_string(raw, DISPLAY_NAME_FIELDS);
    let filename = first_string(raw, FILENAME_FIELDS);

    let link = first_string(raw, LINK_FIELDS)
        .filter(|v| is_url_like(v))
        .or_else(|| {
            raw.get("metadata")
                .and_then(|m| first_string(m, METADATA_LINK_FIELDS))
                .filter(|v| is_url_like(v))
        })
        .unwrap_or_else(|| {
            let identifier = display_name
                .as_deref()
                .or(filename.as_deref())
                .map(slugify)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("document-{}", ordinal));
            synthesize_link(kb_domain, &identifier)
        });

    let title = display_name
        .or_else(|| filename.as_deref().map(humanize_filename).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| format!("Document {}", ordinal));

    RetrievedDocument { text, title, link }
}

/// Normalize diagram payloads, dropping entries without graphic markup and
/// numbering the survivors from 1.
pub fn normalize_diagrams(raw: &[Value]) -> Vec<DiagramRecord> {
    raw.iter()
        .filter_map(|entry| {
            let svg = first_string(entry, SVG_FIELDS)?;
            Some((entry, svg))
        })
        .enumerate()
        .map(|(i, (entry, svg_markup))| {
            let index = i + 1;
            let title = first_string(entry, DISPLAY_NAME_FIELDS)
                .or_else(|| {
                    first_string(entry, FILENAME_FIELDS)
                        .map(|f| humanize_filename(&f))
                        .filter(|t| !t.is_empty())
                })
                .unwrap_or_else(|| format!("BIAN Diagram {}", index));

            DiagramRecord {
                index,
                title,
                svg_markup,
                source_url: first_string(entry, DIAGRAM_URL_FIELDS).unwrap_or_default(),
            }
        })
        .collect()
}

pub fn synthesize_link(kb_domain: &str, identifier: &str) -> String {
    format!(
        "https://{}/reference/{}",
        kb_domain.trim_end_matches('/'),
        urlencoding::encode(identifier)
    )
}

/// Path and extension stripped, whitespace runs to `-`, lowercased.
pub fn slugify(name: &str) -> String {
    strip_extension(strip_path(name.trim()))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// `bian_service-landscape.pdf` -> `Bian Service Landscape`
pub fn humanize_filename(name: &str) -> String {
    strip_extension(strip_path(name.trim()))
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_string(value: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        value
            .get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn is_url_like(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn strip_path(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let ext = &name[dot + 1..];
            if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                &name[..dot]
            } else {
                name
            }
        }
        _ => name,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

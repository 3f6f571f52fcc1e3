use serde::{Deserialize, Serialize};

/// A document returned by the knowledge-base retrieval service, after field
/// normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub text: String,
    pub title: String,
    pub link: String,
}

/// A retrieved diagram. `index` is 1-based and assigned at retrieval time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagramRecord {
    pub index: usize,
    pub title: String,
    #[serde(rename = "svg_content")]
    pub svg_markup: String,
    pub source_url: String,
}

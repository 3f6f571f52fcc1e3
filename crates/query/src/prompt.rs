use schema::{DiagramRecord, RetrievedDocument};

/// Tag attached to each document in the drafting prompt. Models echo it back
/// as a citation, which assembly later resolves to a reference number.
pub fn source_tag(position: usize, link: &str) -> String {
    format!("[source={}&link={}]", position, link)
}

pub fn build_rewrite_prompt(question: &str) -> String {
    format!(
        r#"# ROLE
You are an expert query transformation assistant specializing in the BIAN domain.

# TASK
Transform the user's natural language question into a precise English query optimized for BIAN document retrieval.

# REQUIREMENTS
- Focus on key BIAN concepts, technical terms, Service Domains, or Service Operations
- Preserve the core semantic meaning and intent
- Remove conversational fillers and unnecessary context
- Output only the rewritten query string, with no preamble or explanation

# INPUT
Original User Question: "{}"

# OUTPUT
Output only the rewritten English query string."#,
        question
    )
}

pub fn format_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("{}\n{}", source_tag(i + 1, &doc.link), doc.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_draft_prompt(question: &str, documents: &[RetrievedDocument]) -> String {
    format!(
        r#"# ROLE
You are an expert assistant on BIAN (Banking Industry Architecture Network), skilled at explaining banking architecture and financial technology standards.

# TASK
Give the user a comprehensive, accurate and professional answer about BIAN, covering the framework, Service Domains and implementation approaches as relevant.

# REQUIREMENTS
- Combine your own BIAN knowledge, the document excerpts below and, when available, web search results
- Prefer accuracy over breadth
- When you use an excerpt, cite it by repeating its tag exactly, e.g. [source=1&link=...]
- Structure the answer with headings, lists or tables where it helps readability
- If you are unsure or need more information, say so

# INPUT
Original user question: "{}"

Document excerpts:
<chunks>
{}
</chunks>

# OUTPUT
A complete, well-structured answer with citations."#,
        question,
        format_documents(documents)
    )
}

pub fn build_classification_prompt(question: &str, draft: &str) -> String {
    format!(
        r#"Decide whether architecture diagrams would help the reader understand the answer below.

QUESTION:
{}

ANSWER:
{}

RULES:
- Output ONLY a JSON object, no markdown, no explanations
- Use exactly this schema: {{"needDiagram": true|false, "keywords": "3-5 space separated retrieval keywords"}}
- Set "keywords" to an empty string when "needDiagram" is false

JSON OUTPUT:"#,
        question, draft
    )
}

pub fn format_diagram_list(diagrams: &[DiagramRecord]) -> String {
    diagrams
        .iter()
        .map(|d| format!("Diagram {}: {}", d.index, d.title))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_refine_prompt(question: &str, draft: &str, diagrams: &[DiagramRecord]) -> String {
    format!(
        r#"You are improving an existing answer by pointing the reader to relevant diagrams.

QUESTION:
{}

AVAILABLE DIAGRAMS:
{}

CURRENT ANSWER:
{}

INSTRUCTIONS:
- Insert a reference of the form [See Diagram N: Title] where a diagram illustrates the surrounding text
- Only use the diagram numbers listed above
- Keep the existing structure, headings and [source=...] citations unchanged
- Do not add a separate list of diagrams at the end
- Output only the revised answer

REVISED ANSWER:"#,
        question,
        format_diagram_list(diagrams),
        draft
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_are_tagged_in_order() {
        let documents = vec![
            RetrievedDocument { text: "first".into(), title: "A".into(), link: "https://bian.org/a".into() },
            RetrievedDocument { text: "second".into(), title: "B".into(), link: "https://bian.org/b".into() },
        ];

        let formatted = format_documents(&documents);
        assert_eq!(
            formatted,
            "[source=1&link=https://bian.org/a]\nfirst\n\n[source=2&link=https://bian.org/b]\nsecond"
        );
        assert!(build_draft_prompt("q", &documents).contains("[source=2&link=https://bian.org/b]"));
    }

    #[test]
    fn test_refine_prompt_lists_indices() {
        let diagrams = vec![DiagramRecord {
            index: 1,
            title: "Payment Execution".into(),
            svg_markup: "<svg/>".into(),
            source_url: String::new(),
        }];
        assert!(build_refine_prompt("q", "draft", &diagrams).contains("Diagram 1: Payment Execution"));
    }
}

use std::sync::Arc;
use std::time::Instant;

use generate::{GenerateOptions, Generator};
use retrieve::Retriever;
use schema::message::split_active_question;
use schema::{ConversationMessage, DiagramRecord, PipelineResult, PipelineTrace, StageTiming};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::{DiagramDecision, parse_decision};
use crate::outcome::{Stage, StageOutcome};
use crate::prompt;
use crate::references::assemble;
use crate::PipelineError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    Fast,     // Retrieve and draft only
    Balanced, // Rewrite the query, then draft
    #[default]
    Full,     // Every stage, diagrams included
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineOptions {
    pub rewrite_query: bool,
    pub diagrams: bool,
    pub web_search: bool,
    pub diagram_limit: usize,
}

impl PipelineOptions {
    pub fn for_mode(mode: PipelineMode) -> Self {
        let (rewrite_query, diagrams) = match mode {
            PipelineMode::Fast => (false, false),
            PipelineMode::Balanced => (true, false),
            PipelineMode::Full => (true, true),
        };

        Self {
            rewrite_query,
            diagrams,
            web_search: true,
            diagram_limit: 3,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::for_mode(PipelineMode::Full)
    }
}

/// Orchestrates rewrite → retrieve → draft → classify → diagrams → refine →
/// assemble for one request. Holds no per-request state.
pub struct AnswerPipeline {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn Retriever>,
    options: PipelineOptions,
}

impl AnswerPipeline {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            generator,
            retriever,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn run(&self, messages: &[ConversationMessage]) -> Result<PipelineResult, PipelineError> {
        if messages.is_empty() {
            return Err(PipelineError::Validation("No messages provided".to_string()));
        }
        let (active, history) = split_active_question(messages).ok_or_else(|| {
            PipelineError::Validation("No user message found in the conversation".to_string())
        })?;
        let question = active.content.trim();
        if question.is_empty() {
            return Err(PipelineError::Validation("The user message is empty".to_string()));
        }

        let mut trace = PipelineTrace::default();

        // Step 1: Rewrite the question for retrieval
        let started = Instant::now();
        let query = if self.options.rewrite_query {
            let rewritten = self
                .rewrite(question)
                .await
                .resolve(Stage::Rewriting, &mut trace)?;
            record(&mut trace, Stage::Rewriting, started);
            trace.rewritten_query = Some(rewritten.clone());
            rewritten
        } else {
            question.to_string()
        };

        // Step 2: Retrieve supporting documents
        let started = Instant::now();
        let documents = StageOutcome::required(
            self.retriever.retrieve_documents(&query, history).await,
        )
        .resolve(Stage::Retrieving, &mut trace)?;
        record(&mut trace, Stage::Retrieving, started);
        trace.documents_retrieved = documents.len();

        // Step 3: Draft the answer
        let started = Instant::now();
        let draft_options = if self.options.web_search {
            GenerateOptions::grounded()
        } else {
            GenerateOptions::default()
        };
        let draft = StageOutcome::required(
            self.generator
                .generate(&prompt::build_draft_prompt(question, &documents), &draft_options)
                .await,
        )
        .resolve(Stage::Drafting, &mut trace)?;
        record(&mut trace, Stage::Drafting, started);

        if let Some(grounding) = &draft.grounding_metadata {
            debug!(
                chunks = grounding.grounding_chunks.len(),
                supports = grounding.grounding_supports.len(),
                has_entry_point = grounding.search_entry_point.is_some(),
                "Draft carries grounding metadata"
            );
        }

        let mut answer = draft.text.clone();
        let mut diagrams: Vec<DiagramRecord> = Vec::new();

        if self.options.diagrams {
            // Step 4: Would diagrams help?
            let started = Instant::now();
            let decision = self
                .classify(question, &draft.text)
                .await
                .resolve(Stage::Classifying, &mut trace)?;
            record(&mut trace, Stage::Classifying, started);

            // Step 5: Fetch them
            if decision.wants_diagrams() {
                let started = Instant::now();
                trace.diagram_keywords = Some(decision.keywords.clone());
                diagrams = StageOutcome::advisory(
                    self.retriever
                        .retrieve_diagrams(&decision.keywords, self.options.diagram_limit)
                        .await,
                    Vec::new,
                )
                .resolve(Stage::DiagramRetrieval, &mut trace)?;
                diagrams.truncate(self.options.diagram_limit);
                record(&mut trace, Stage::DiagramRetrieval, started);
                trace.diagrams_retrieved = diagrams.len();
            }

            // Step 6: Weave diagram references into the draft
            if !diagrams.is_empty() {
                let started = Instant::now();
                let outcome = self.refine(question, &draft.text, &diagrams).await;
                trace.refined = !outcome.is_fallback();
                answer = outcome.resolve(Stage::Refining, &mut trace)?;
                record(&mut trace, Stage::Refining, started);
            }
        }

        // Step 7: Citations and references
        let started = Instant::now();
        let assembled = assemble(&answer, &documents, draft.grounding_metadata.as_ref());
        record(&mut trace, Stage::Assembling, started);

        info!(
            documents = trace.documents_retrieved,
            diagrams = diagrams.len(),
            references = assembled.references.len(),
            refined = trace.refined,
            fallbacks = trace.fallbacks.len(),
            stage = %Stage::Done,
            "Answer composed"
        );

        Ok(PipelineResult {
            answer_text: assembled.text,
            references: assembled.references,
            diagrams,
            trace,
        })
    }

    async fn rewrite(&self, question: &str) -> StageOutcome<String> {
        let result = self
            .generator
            .generate(&prompt::build_rewrite_prompt(question), &GenerateOptions::default())
            .await
            .map(|generation| clean_rewrite(&generation.text))
            .and_then(|text| {
                if text.is_empty() {
                    Err(generate::GenerationError::Empty)
                } else {
                    Ok(text)
                }
            });

        if let Ok(rewritten) = &result {
            info!(rewritten = %rewritten, "Query rewritten");
        }
        StageOutcome::advisory(result, || question.to_string())
    }

    async fn classify(&self, question: &str, draft: &str) -> StageOutcome<DiagramDecision> {
        let prompt = prompt::build_classification_prompt(question, draft);
        let result = match self.generator.generate(&prompt, &GenerateOptions::json()).await {
            Ok(generation) => parse_decision(&generation.text).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Ok(decision) = &result {
            info!(
                need_diagram = decision.need_diagram,
                keywords = %decision.keywords,
                "Diagram need classified"
            );
        }
        StageOutcome::advisory(result, DiagramDecision::default)
    }

    async fn refine(
        &self,
        question: &str,
        draft: &str,
        diagrams: &[DiagramRecord],
    ) -> StageOutcome<String> {
        let prompt = prompt::build_refine_prompt(question, draft, diagrams);
        let result = self
            .generator
            .generate(&prompt, &GenerateOptions::default())
            .await
            .and_then(|generation| {
                if generation.text.trim().is_empty() {
                    Err(generate::GenerationError::Empty)
                } else {
                    Ok(generation.text)
                }
            });

        StageOutcome::advisory(result, || draft.to_string())
    }
}

fn record(trace: &mut PipelineTrace, stage: Stage, started: Instant) {
    trace.timings.push(StageTiming {
        stage: stage.as_str().to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    });
}

/// Models sometimes wrap the rewritten query in quotes or add a label.
fn clean_rewrite(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or_default().trim();
    let line = line
        .strip_prefix("Rewritten query:")
        .map(str::trim)
        .unwrap_or(line);
    line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGenerator, StaticRetriever, diagram, document, reply};
    use generate::GenerationError;
    use retrieve::RetrievalError;
    use schema::{AnswerDocument, GroundingChunk, GroundingMetadata, WebSource};

    fn question(text: &str) -> Vec<ConversationMessage> {
        vec![ConversationMessage::user(text)]
    }

    fn pipeline(
        generator: Arc<ScriptedGenerator>,
        retriever: Arc<StaticRetriever>,
        mode: PipelineMode,
    ) -> AnswerPipeline {
        AnswerPipeline::new(generator, retriever, PipelineOptions::for_mode(mode))
    }

    #[tokio::test]
    async fn test_service_domain_without_diagrams() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            reply("BIAN Service Domain definition"),
            reply("A Service Domain is ..."),
            reply(r#"{"needDiagram": false, "keywords": ""}"#),
        ]));
        let retriever = Arc::new(StaticRetriever::with_documents(vec![document(
            "BIAN Book",
            "https://bian.org/book",
        )]));

        let result = pipeline(generator.clone(), retriever.clone(), PipelineMode::Full)
            .run(&question("What is a Service Domain?"))
            .await
            .unwrap();

        assert!(result.answer_text.starts_with("A Service Domain is ..."));
        assert!(result.answer_text.contains("### References"));
        assert!(result.answer_text.ends_with("- [1] BIAN Book <https://bian.org/book>\n"));
        assert_eq!(result.references.len(), 1);
        assert!(result.diagrams.is_empty());
        assert_eq!(generator.prompts().len(), 3);
        assert_eq!(retriever.document_queries(), vec!["BIAN Service Domain definition"]);
        assert_eq!(retriever.diagram_calls(), 0);
        assert_eq!(result.trace.rewritten_query.as_deref(), Some("BIAN Service Domain definition"));
    }

    #[tokio::test]
    async fn test_diagrams_are_retrieved_and_referenced() {
        let refined = "Payments flow [See Diagram 1: Payment Order] then [See Diagram 2: Payment Execution].";
        let generator = Arc::new(ScriptedGenerator::new(vec![
            reply("payment execution"),
            reply("Payments flow through two domains."),
            reply(r#"{"needDiagram": true, "keywords": "payment execution"}"#),
            reply(refined),
        ]));
        let retriever = Arc::new(
            StaticRetriever::with_documents(vec![document("Payments", "https://bian.org/pay")])
                .and_diagrams(vec![diagram(1, "Payment Order"), diagram(2, "Payment Execution")]),
        );

        let result = pipeline(generator.clone(), retriever.clone(), PipelineMode::Full)
            .run(&question("How are payments executed?"))
            .await
            .unwrap();

        assert!(result.trace.refined);
        assert_eq!(result.diagrams.len(), 2);
        assert_eq!(retriever.diagram_keywords(), vec!["payment execution"]);

        let indices = AnswerDocument::parse(&result.answer_text).diagram_indices();
        assert_eq!(indices, vec![1, 2]);
        for index in indices {
            assert!(result.diagrams.iter().any(|d| d.index == index));
        }
        assert!(generator.prompts()[3].contains("Diagram 2: Payment Execution"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_aborts() {
        let generator = Arc::new(ScriptedGenerator::new(vec![reply("rewritten")]));
        let retriever = Arc::new(StaticRetriever::failing_documents(500));

        let err = pipeline(generator, retriever, PipelineMode::Full)
            .run(&question("q"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Retrieval(RetrievalError::Upstream { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_classification_means_no_diagrams() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            reply("rewritten"),
            reply("Draft answer"),
            reply("```json\n{\"needDiagram\": tru"),
        ]));
        let retriever = Arc::new(
            StaticRetriever::with_documents(vec![]).and_diagrams(vec![diagram(1, "Unused")]),
        );

        let result = pipeline(generator, retriever.clone(), PipelineMode::Full)
            .run(&question("q"))
            .await
            .unwrap();

        assert_eq!(result.answer_text, "Draft answer");
        assert!(result.diagrams.is_empty());
        assert_eq!(retriever.diagram_calls(), 0);
        assert_eq!(result.trace.fallbacks, vec!["classifying"]);
    }

    #[tokio::test]
    async fn test_rewrite_failure_falls_back_to_question() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(GenerationError::Upstream { status: 503, body: "busy".into() }),
            reply("Draft"),
        ]));
        let retriever = Arc::new(StaticRetriever::with_documents(vec![]));

        let result = pipeline(generator, retriever.clone(), PipelineMode::Balanced)
            .run(&question("  What is BIAN?  "))
            .await
            .unwrap();

        assert_eq!(retriever.document_queries(), vec!["What is BIAN?"]);
        assert_eq!(result.trace.fallbacks, vec!["rewriting"]);
        assert_eq!(result.answer_text, "Draft");
    }

    #[tokio::test]
    async fn test_empty_draft_is_fatal() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(GenerationError::Empty)]));
        let retriever = Arc::new(StaticRetriever::with_documents(vec![]));

        let err = pipeline(generator, retriever, PipelineMode::Fast)
            .run(&question("q"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Generation(GenerationError::Empty)));
    }

    #[tokio::test]
    async fn test_refine_failure_keeps_draft_and_diagrams() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            reply("rewritten"),
            reply("Draft answer"),
            reply(r#"{"needDiagram": true, "keywords": "customer offer"}"#),
            reply("   "),
        ]));
        let retriever = Arc::new(
            StaticRetriever::with_documents(vec![]).and_diagrams(vec![diagram(1, "Offer")]),
        );

        let result = pipeline(generator, retriever, PipelineMode::Full)
            .run(&question("q"))
            .await
            .unwrap();

        assert_eq!(result.answer_text, "Draft answer");
        assert!(!result.trace.refined);
        assert_eq!(result.diagrams.len(), 1);
        assert_eq!(result.trace.fallbacks, vec!["refining"]);
    }

    #[tokio::test]
    async fn test_diagram_failure_skips_refinement() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            reply("rewritten"),
            reply("Draft answer"),
            reply(r#"{"needDiagram": true, "keywords": "customer offer"}"#),
        ]));
        let retriever = Arc::new(StaticRetriever::with_documents(vec![]).failing_diagrams(502));

        let result = pipeline(generator.clone(), retriever, PipelineMode::Full)
            .run(&question("q"))
            .await
            .unwrap();

        assert_eq!(result.answer_text, "Draft answer");
        assert_eq!(generator.prompts().len(), 3);
        assert_eq!(result.trace.fallbacks, vec!["diagram_retrieval"]);
    }

    #[tokio::test]
    async fn test_grounding_and_history() {
        let grounding = GroundingMetadata {
            grounding_chunks: vec![GroundingChunk {
                web: Some(WebSource {
                    uri: Some("https://example.com/sd".into()),
                    title: Some("Service Domains explained".into()),
                }),
            }],
            web_search_queries: vec!["bian service domain".into()],
            ..GroundingMetadata::default()
        };
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(generate::Generation {
            text: "Answer [source=1&link=https://bian.org/book]".into(),
            grounding_metadata: Some(grounding),
        })]));
        let retriever = Arc::new(StaticRetriever::with_documents(vec![document(
            "BIAN Book",
            "https://bian.org/book",
        )]));

        let messages = vec![
            ConversationMessage::user("earlier"),
            ConversationMessage::assistant("reply"),
            ConversationMessage::user("now"),
        ];
        let result = pipeline(generator, retriever.clone(), PipelineMode::Fast)
            .run(&messages)
            .await
            .unwrap();

        assert!(result.answer_text.starts_with("Answer [1]"));
        assert!(result.answer_text.contains("- [2] Service Domains explained <https://example.com/sd>"));
        assert!(result.answer_text.contains("- bian service domain"));
        assert_eq!(retriever.history_lengths(), vec![2]);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let pipeline = pipeline(
            Arc::new(ScriptedGenerator::new(vec![])),
            Arc::new(StaticRetriever::with_documents(vec![])),
            PipelineMode::Full,
        );

        for messages in [
            vec![],
            vec![ConversationMessage::assistant("hi")],
            vec![ConversationMessage::user("   ")],
        ] {
            let err = pipeline.run(&messages).await.unwrap_err();
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(clean_rewrite("\"BIAN Service Domain\"\n"), "BIAN Service Domain");
        assert_eq!(clean_rewrite("Rewritten query: payment order"), "payment order");
        assert_eq!(clean_rewrite("  "), "");
    }
}

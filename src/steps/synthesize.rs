//! Context assembly and answer drafting

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::orchestration::pipeline::SYNTHESIZE;
use crate::orchestration::{Node, NodeOutput, ReasoningState, RunContext};
use crate::providers::TextGenerator;
use crate::retrieval::types::{META_HIERARCHY_PATH, META_SECTION_TITLE};
use crate::retrieval::RetrievedDocument;
use crate::steps::{ask, format_findings};
use crate::types::GenerationParams;

const SYSTEM_PROMPT: &str = "You answer a research sub-question strictly from the provided context. \
Cite documents by their bracketed number. If the context does not contain the answer, say so.";

/// Context assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum tokens for retrieved context
    pub max_context_tokens: usize,
    /// Include score and source location with each document
    pub include_metadata: bool,
    pub format: ContextFormat,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 2000,
            include_metadata: true,
            format: ContextFormat::Structured,
        }
    }
}

/// Presentation of the assembled context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
    /// Clear document boundaries
    Structured,
    /// Compact, single line
    Inline,
    Numbered,
}

/// Context ready for a prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub document_count: usize,
    pub estimated_tokens: usize,
    pub document_ids: Vec<String>,
}

/// Token-bounded context assembly over ranked documents
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Include documents in order until the next one would exceed the budget
    pub fn build(&self, documents: &[RetrievedDocument]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut total_tokens = 0;
        let mut document_ids = Vec::new();

        for doc in documents {
            // ~4 chars per token
            let doc_tokens = doc.content.chars().count() / 4;
            if total_tokens + doc_tokens > self.config.max_context_tokens {
                break;
            }

            parts.push(self.format_document(parts.len() + 1, doc));
            total_tokens += doc_tokens;
            document_ids.push(doc.id.clone());
        }

        if parts.is_empty() {
            return AssembledContext::default();
        }

        let text = match self.config.format {
            ContextFormat::Structured => format!(
                "Retrieved Context ({} documents):\n\n{}\n",
                parts.len(),
                parts.join("\n\n")
            ),
            ContextFormat::Inline => format!("Context: {}", parts.join(" | ")),
            ContextFormat::Numbered => format!("Context:\n{}\n", parts.join("\n")),
        };

        AssembledContext {
            text,
            document_count: parts.len(),
            estimated_tokens: total_tokens,
            document_ids,
        }
    }

    fn format_document(&self, index: usize, doc: &RetrievedDocument) -> String {
        if !self.config.include_metadata {
            return match self.config.format {
                ContextFormat::Structured => format!("[{}]\n{}", index, doc.content),
                ContextFormat::Inline => doc.content.clone(),
                ContextFormat::Numbered => format!("{}. {}", index, doc.content),
            };
        }

        let location = source_location(doc);
        match self.config.format {
            ContextFormat::Structured => format!(
                "[{}] (score: {:.2}, source: {})\n{}",
                index, doc.score, location, doc.content
            ),
            ContextFormat::Inline => format!("[{}|{:.2}] {}", location, doc.score, doc.content),
            ContextFormat::Numbered => {
                format!("{}. (score: {:.2}) {}", index, doc.score, doc.content)
            }
        }
    }
}

/// `document > section path` when known, else the document id
fn source_location(doc: &RetrievedDocument) -> String {
    let section = doc
        .metadata
        .get(META_HIERARCHY_PATH)
        .or_else(|| doc.metadata.get(META_SECTION_TITLE))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());
    match section {
        Some(section) => format!("{} > {}", doc.document_id(), section),
        None => doc.document_id().to_string(),
    }
}

/// Builds the round's context and drafts an answer to the sub-question
pub struct SynthesizeNode {
    generator: Arc<dyn TextGenerator>,
    builder: ContextBuilder,
    params: GenerationParams,
}

impl SynthesizeNode {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        builder: ContextBuilder,
        params: GenerationParams,
    ) -> Self {
        Self {
            generator,
            builder,
            params,
        }
    }
}

#[async_trait]
impl Node for SynthesizeNode {
    fn name(&self) -> &str {
        SYNTHESIZE
    }

    async fn execute(&self, ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        let context = self.builder.build(&state.reranked);
        state.synthesized_context = context.text;

        if context.document_count == 0 {
            debug!(step = state.cursor(), "no context, skipping draft");
            state.draft_answer = None;
            return Ok(NodeOutput::new(state));
        }

        let (sub_question, dependencies) = match state.current_step() {
            Some(step) => (step.sub_question.clone(), step.dependencies.clone()),
            None => (state.question.clone(), Vec::new()),
        };
        let prompt = format!(
            "{}\nKnown findings:\n{}\n\nSub-question: {}",
            state.synthesized_context,
            format_findings(&state.findings_for(&dependencies)),
            sub_question
        );
        let draft = ask(self.generator.as_ref(), ctx, SYSTEM_PROMPT, prompt, &self.params).await?;

        debug!(
            documents = context.document_count,
            estimated_tokens = context.estimated_tokens,
            "answer drafted"
        );
        state.draft_answer = (!draft.is_empty()).then_some(draft);
        Ok(NodeOutput::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::PlanStep;
    use crate::steps::test_support::EchoGenerator;

    fn doc(id: &str, content: &str) -> RetrievedDocument {
        RetrievedDocument::new(id, content).with_score(0.5)
    }

    #[test]
    fn test_build_respects_token_budget() {
        let builder = ContextBuilder::with_config(ContextConfig {
            max_context_tokens: 10,
            ..Default::default()
        });
        // 24 chars ≈ 6 tokens each
        let docs = vec![
            doc("a", "aaaaaaaaaaaaaaaaaaaaaaaa"),
            doc("b", "bbbbbbbbbbbbbbbbbbbbbbbb"),
        ];
        let context = builder.build(&docs);
        assert_eq!(context.document_count, 1);
        assert_eq!(context.document_ids, vec!["a"]);
        assert_eq!(context.estimated_tokens, 6);
    }

    #[test]
    fn test_structured_format_shows_source() {
        let builder = ContextBuilder::new();
        let docs = vec![doc("p#0", "Results improved.")
            .with_metadata("document_id", "paper")
            .with_metadata(META_HIERARCHY_PATH, "Results > Summary")];
        let context = builder.build(&docs);
        assert!(context.text.starts_with("Retrieved Context (1 documents)"));
        assert!(context.text.contains("source: paper > Results > Summary"));
    }

    #[test]
    fn test_numbered_without_metadata() {
        let builder = ContextBuilder::with_config(ContextConfig {
            include_metadata: false,
            format: ContextFormat::Numbered,
            ..Default::default()
        });
        let context = builder.build(&[doc("a", "first"), doc("b", "second")]);
        assert_eq!(context.text, "Context:\n1. first\n2. second\n");
    }

    #[tokio::test]
    async fn test_drafts_from_context() {
        let generator = Arc::new(EchoGenerator::new("It was 1999 [1]."));
        let node = SynthesizeNode::new(generator.clone(), ContextBuilder::new(), GenerationParams::default());
        let mut state = ReasoningState::new("q");
        state.set_plan(vec![PlanStep::new("When was it released?")]);
        state.reranked = vec![doc("a", "Released in 1999.")];

        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.draft_answer.as_deref(), Some("It was 1999 [1]."));
        assert!(generator.last_prompt().contains("Released in 1999."));
        assert!(generator.last_prompt().contains("When was it released?"));
    }

    #[tokio::test]
    async fn test_no_documents_skips_generator() {
        let generator = Arc::new(EchoGenerator::new("anything"));
        let node = SynthesizeNode::new(generator.clone(), ContextBuilder::new(), GenerationParams::default());

        let output = node.execute(&RunContext::new(), ReasoningState::new("q")).await.unwrap();
        assert!(output.state.draft_answer.is_none());
        assert!(output.state.synthesized_context.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }
}

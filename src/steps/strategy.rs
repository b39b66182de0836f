//! Retrieval strategy selection

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::orchestration::pipeline::SELECT_STRATEGY;
use crate::orchestration::{Node, NodeOutput, ReasoningState, RunContext};
use crate::providers::TextGenerator;
use crate::retrieval::{SchemaFilter, StrategyKind};
use crate::steps::ask;
use crate::types::GenerationParams;

const SYSTEM_PROMPT: &str = "You choose a retrieval strategy for a search query. \
vector: semantic similarity. lexical: exact terms, names, identifiers. \
hybrid: both combined. schema: a specific document section or region. \
Reply with one word.";

/// Picks the retrieval strategy for the current round
pub struct SelectStrategyNode {
    generator: Arc<dyn TextGenerator>,
    available: Vec<StrategyKind>,
    default: StrategyKind,
}

impl SelectStrategyNode {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        available: Vec<StrategyKind>,
        default: StrategyKind,
    ) -> Self {
        Self {
            generator,
            available,
            default,
        }
    }

    fn usable(&self, kind: StrategyKind) -> Option<StrategyKind> {
        self.available.contains(&kind).then_some(kind)
    }
}

#[async_trait]
impl Node for SelectStrategyNode {
    fn name(&self) -> &str {
        SELECT_STRATEGY
    }

    async fn execute(&self, ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        let step = state.current_step().cloned().unwrap_or_default();

        if let Some(kind) = step
            .tool_hint
            .as_deref()
            .and_then(StrategyKind::parse)
            .and_then(|kind| self.usable(kind))
        {
            debug!(strategy = %kind, "strategy from tool hint");
            state.strategy = Some(kind);
            return Ok(NodeOutput::new(state));
        }

        if let Some(hint) = step.schema_hint.as_deref() {
            if self.usable(StrategyKind::Schema).is_some() {
                if let Some(filter) = SchemaFilter::from_hint(&state.schemas, hint) {
                    debug!(
                        hint,
                        documents = filter.document_ids.len(),
                        "schema strategy from hint"
                    );
                    state.schema_filter = Some(filter);
                    state.strategy = Some(StrategyKind::Schema);
                    return Ok(NodeOutput::new(state));
                }
            }
        }

        let options: Vec<&str> = self.available.iter().map(StrategyKind::as_str).collect();
        let prompt = format!(
            "Query: {}\nOptions: {}",
            state
                .current_query
                .as_deref()
                .unwrap_or(step.sub_question.as_str()),
            options.join(", ")
        );
        let text = ask(
            self.generator.as_ref(),
            ctx,
            SYSTEM_PROMPT,
            prompt,
            &GenerationParams::structured(),
        )
        .await?;

        let kind = text
            .split_whitespace()
            .find_map(StrategyKind::parse)
            .and_then(|kind| self.usable(kind))
            .unwrap_or(self.default);
        debug!(strategy = %kind, "strategy selected");
        state.strategy = Some(kind);
        Ok(NodeOutput::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::PlanStep;
    use crate::schema::{DocumentSchema, Section};
    use crate::steps::test_support::EchoGenerator;
    use std::collections::HashMap;

    fn node(reply: &str) -> (Arc<EchoGenerator>, SelectStrategyNode) {
        let generator = Arc::new(EchoGenerator::new(reply));
        let node = SelectStrategyNode::new(
            generator.clone(),
            StrategyKind::ALL.to_vec(),
            StrategyKind::Hybrid,
        );
        (generator, node)
    }

    fn state_with(step: PlanStep) -> ReasoningState {
        let mut state = ReasoningState::new("q");
        state.set_plan(vec![step]);
        state
    }

    #[tokio::test]
    async fn test_tool_hint_wins() {
        let (generator, node) = node("vector");
        let state = state_with(PlanStep::new("find error E042").with_tool_hint("BM25"));
        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.strategy, Some(StrategyKind::Lexical));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schema_hint_builds_filter() {
        let (_, node) = node("vector");
        let schema = DocumentSchema::new("paper-1", "text").with_sections(vec![
            Section::new("s1", "Methodology", 1).with_type("methods"),
        ]);
        let mut schemas = HashMap::new();
        schemas.insert("paper-1".to_string(), schema);

        let state = state_with(PlanStep::new("how was it measured").with_schema_hint("methodology"))
            .with_schemas(schemas);
        let output = node.execute(&RunContext::new(), state).await.unwrap();

        assert_eq!(output.state.strategy, Some(StrategyKind::Schema));
        let filter = output.state.schema_filter.unwrap();
        assert_eq!(filter.document_ids, vec!["paper-1"]);
        assert_eq!(filter.section_types, vec!["methods"]);
    }

    #[tokio::test]
    async fn test_unmatched_schema_hint_asks_generator() {
        let (_, node) = node("I would use lexical search.");
        let state = state_with(PlanStep::new("q").with_schema_hint("appendix"));
        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.strategy, Some(StrategyKind::Lexical));
        assert!(output.state.schema_filter.is_none());
    }

    #[tokio::test]
    async fn test_unparsable_reply_uses_default() {
        let (_, node) = node("no idea");
        let output = node
            .execute(&RunContext::new(), state_with(PlanStep::new("q")))
            .await
            .unwrap();
        assert_eq!(output.state.strategy, Some(StrategyKind::Hybrid));
    }

    #[tokio::test]
    async fn test_unavailable_kind_is_ignored() {
        let generator = Arc::new(EchoGenerator::new("schema"));
        let node = SelectStrategyNode::new(
            generator,
            vec![StrategyKind::Vector],
            StrategyKind::Vector,
        );
        let state = state_with(PlanStep::new("q").with_tool_hint("lexical"));
        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.strategy, Some(StrategyKind::Vector));
    }
}

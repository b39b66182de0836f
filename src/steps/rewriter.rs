//! Sub-question to search query rewriting

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::orchestration::pipeline::REWRITE;
use crate::orchestration::{Node, NodeOutput, ReasoningState, RunContext};
use crate::providers::TextGenerator;
use crate::steps::{ask, format_findings};
use crate::types::GenerationParams;

const SYSTEM_PROMPT: &str = "You rewrite research sub-questions into concise search queries. \
Use the known findings to resolve references. Reply with the query only.";

/// Opens a reasoning round and produces the search query
pub struct RewriteNode {
    generator: Arc<dyn TextGenerator>,
    params: GenerationParams,
}

impl RewriteNode {
    pub fn new(generator: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self { generator, params }
    }
}

/// First non-empty line, without surrounding quotes
fn clean_query(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line
        .strip_prefix("Query:")
        .or_else(|| line.strip_prefix("query:"))
        .unwrap_or(line)
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    (!line.is_empty()).then(|| line.to_string())
}

#[async_trait]
impl Node for RewriteNode {
    fn name(&self) -> &str {
        REWRITE
    }

    async fn execute(&self, ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        state.begin_round();

        let step = state.current_step().cloned();
        let (sub_question, dependencies) = match &step {
            Some(step) => (step.sub_question.clone(), step.dependencies.clone()),
            None => (state.question.clone(), Vec::new()),
        };

        let prompt = format!(
            "Original question: {}\nSub-question: {}\nKnown findings:\n{}",
            state.question,
            sub_question,
            format_findings(&state.findings_for(&dependencies))
        );
        let text = ask(self.generator.as_ref(), ctx, SYSTEM_PROMPT, prompt, &self.params).await?;

        let query = clean_query(&text).unwrap_or_else(|| sub_question.clone());
        debug!(step = state.cursor(), query = %query, "sub-question rewritten");
        state.current_query = Some(query);
        Ok(NodeOutput::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::{PastStep, PlanStep};
    use crate::steps::test_support::EchoGenerator;

    #[test]
    fn test_clean_query() {
        assert_eq!(clean_query("\n  \"rust borrow checker\"\nextra"), Some("rust borrow checker".to_string()));
        assert_eq!(clean_query("Query: tokio runtime"), Some("tokio runtime".to_string()));
        assert_eq!(clean_query("   \n "), None);
        assert_eq!(clean_query("\"\""), None);
    }

    #[tokio::test]
    async fn test_uses_dependency_findings() {
        let generator = Arc::new(EchoGenerator::new("founder birthplace"));
        let node = RewriteNode::new(generator.clone(), GenerationParams::default());

        let mut state = ReasoningState::new("Where was the founder born?");
        state.set_plan(vec![
            PlanStep::new("Who founded it?"),
            PlanStep::new("Where was that person born?").with_dependencies(vec![0]),
        ]);
        state.past_steps.push(PastStep {
            step_index: 0,
            step: PlanStep::new("Who founded it?"),
            documents: Vec::new(),
            summary: String::new(),
            key_findings: vec!["Ada founded it".to_string()],
            elapsed_ms: 0,
        });
        state.advance();
        state.retrieved.push(crate::retrieval::RetrievedDocument::new("stale", "x"));

        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.current_query.as_deref(), Some("founder birthplace"));
        assert!(output.state.retrieved.is_empty());
        assert!(generator.last_prompt().contains("Ada founded it"));
    }

    #[tokio::test]
    async fn test_empty_output_falls_back_to_sub_question() {
        let node = RewriteNode::new(Arc::new(EchoGenerator::new("  ")), GenerationParams::default());
        let mut state = ReasoningState::new("q");
        state.set_plan(vec![PlanStep::new("What is BM25?")]);

        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.current_query.as_deref(), Some("What is BM25?"));
    }
}

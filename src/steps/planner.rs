//! Question decomposition

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::orchestration::pipeline::PLAN;
use crate::orchestration::{Node, NodeOutput, PlanStep, ReasoningState, RunContext};
use crate::parsing::parse_embedded_json;
use crate::providers::TextGenerator;
use crate::steps::ask;
use crate::types::GenerationParams;

const SYSTEM_PROMPT: &str = "You decompose questions into an ordered research plan. \
Respond with JSON only: {\"steps\": [{\"sub_question\": \"...\", \"tool_hint\": \"vector|lexical|hybrid|schema or null\", \
\"schema_hint\": \"section or region name, or null\", \"expected_outputs\": [\"...\"], \"dependencies\": [0]}]}. \
Dependencies are indices of earlier steps.";

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default, alias = "plan")]
    steps: Vec<PlanStep>,
}

/// Splits the question into ordered sub-questions
pub struct PlanNode {
    generator: Arc<dyn TextGenerator>,
    max_steps: usize,
}

impl PlanNode {
    pub fn new(generator: Arc<dyn TextGenerator>, max_steps: usize) -> Self {
        Self {
            generator,
            max_steps: max_steps.max(1),
        }
    }

    /// Parse generated text into a usable plan
    ///
    /// Steps with a blank sub-question are dropped and dependency indices
    /// are renumbered to the surviving steps. Dependencies on dropped steps
    /// or on later positions are discarded, and the plan is capped.
    /// Anything unusable becomes a single step holding the original question.
    pub fn parse_plan(&self, question: &str, text: &str) -> Vec<PlanStep> {
        let steps = match parse_embedded_json::<PlanResponse>(text) {
            Ok(response) => response.steps,
            Err(e) => {
                warn!(error = %e, "plan output unparsable, using single step");
                Vec::new()
            }
        };

        // original index -> position in the kept plan
        let mut renumbered: HashMap<usize, usize> = HashMap::new();
        let mut plan: Vec<PlanStep> = Vec::new();
        for (original, mut step) in steps.into_iter().enumerate() {
            if plan.len() == self.max_steps {
                break;
            }
            let sub_question = step.sub_question.trim();
            if sub_question.is_empty() {
                continue;
            }
            step.sub_question = sub_question.to_string();

            let position = plan.len();
            let mut dependencies: Vec<usize> = step
                .dependencies
                .iter()
                .filter_map(|dependency| renumbered.get(dependency).copied())
                .filter(|&dependency| dependency < position)
                .collect();
            dependencies.sort_unstable();
            dependencies.dedup();
            step.dependencies = dependencies;

            renumbered.insert(original, position);
            plan.push(step);
        }

        if plan.is_empty() {
            plan.push(PlanStep::new(question));
        }
        plan
    }
}

#[async_trait]
impl Node for PlanNode {
    fn name(&self) -> &str {
        PLAN
    }

    async fn execute(&self, ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        let prompt = format!(
            "Question: {}\n\nProduce at most {} steps.",
            state.question, self.max_steps
        );
        let text = ask(
            self.generator.as_ref(),
            ctx,
            SYSTEM_PROMPT,
            prompt,
            &GenerationParams::structured(),
        )
        .await?;

        let plan = self.parse_plan(&state.question, &text);
        debug!(steps = plan.len(), "question planned");
        state.set_plan(plan);
        Ok(NodeOutput::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::test_support::EchoGenerator;

    fn node(max_steps: usize) -> PlanNode {
        PlanNode::new(Arc::new(EchoGenerator::new("")), max_steps)
    }

    #[test]
    fn test_parse_plan_drops_forward_dependencies() {
        let text = r#"Here you go: {"steps": [
            {"sub_question": "Who wrote it?", "dependencies": [1]},
            {"sub_question": "When was it published?", "dependencies": "0"},
            {"question": "Where?", "dependencies": {"step_0": true, "step_2": true}}
        ]}"#;
        let plan = node(5).parse_plan("q", text);

        assert_eq!(plan.len(), 3);
        assert!(plan[0].dependencies.is_empty());
        assert_eq!(plan[1].dependencies, vec![0]);
        assert_eq!(plan[2].sub_question, "Where?");
        assert_eq!(plan[2].dependencies, vec![0]);
    }

    #[test]
    fn test_parse_plan_renumbers_after_blank_steps() {
        let text = r#"{"steps": [
            {"sub_question": ""},
            {"sub_question": "Who founded Acme?"},
            {"sub_question": "Where was the founder born?", "dependencies": [1]},
            {"sub_question": "   ", "dependencies": [1]},
            {"sub_question": "Summarise", "dependencies": [0, 2, 3]}
        ]}"#;
        let plan = node(5).parse_plan("q", text);

        let shape: Vec<(&str, Vec<usize>)> = plan
            .iter()
            .map(|step| (step.sub_question.as_str(), step.dependencies.clone()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("Who founded Acme?", vec![]),
                ("Where was the founder born?", vec![0]),
                ("Summarise", vec![1]),
            ]
        );
    }

    #[test]
    fn test_parse_plan_caps_steps() {
        let text = r#"{"steps": [{"sub_question": "a"}, {"sub_question": "b"}, {"sub_question": "c"}]}"#;
        let plan = node(2).parse_plan("q", text);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_parse_plan_fallback() {
        let plan = node(5).parse_plan("What is X?", "I cannot plan this");
        assert_eq!(plan, vec![PlanStep::new("What is X?")]);

        let plan = node(5).parse_plan("What is X?", r#"{"steps": [{"sub_question": "  "}]}"#);
        assert_eq!(plan, vec![PlanStep::new("What is X?")]);
    }

    #[tokio::test]
    async fn test_execute_sets_plan() {
        let generator = Arc::new(EchoGenerator::new(
            r#"{"steps": [{"sub_question": "a", "tool_hint": "lexical"}]}"#,
        ));
        let node = PlanNode::new(generator.clone(), 3);
        let output = node
            .execute(&RunContext::new(), ReasoningState::new("Compare A and B"))
            .await
            .unwrap();

        assert_eq!(output.state.plan().len(), 1);
        assert_eq!(output.state.plan()[0].tool_hint.as_deref(), Some("lexical"));
        assert!(generator.last_prompt().contains("Compare A and B"));
    }
}

//! Continuation decision and final answer

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::orchestration::pipeline::DECIDE;
use crate::orchestration::{Node, NodeOutput, ReasoningState, RunContext};
use crate::providers::TextGenerator;
use crate::steps::ask;
use crate::types::GenerationParams;

const SYSTEM_PROMPT: &str = "You write the final answer to a research question from the findings \
of the completed steps. Be direct and mention uncertainty where findings are incomplete.";

const NO_ANSWER: &str = "No answer could be derived from the available documents.";

/// Ends a round: continue with the next step or write the final answer
pub struct DecideNode {
    generator: Arc<dyn TextGenerator>,
    params: GenerationParams,
}

impl DecideNode {
    pub fn new(generator: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self { generator, params }
    }

    fn compose_prompt(state: &ReasoningState) -> String {
        let steps = state
            .past_steps
            .iter()
            .map(|past| {
                let findings = if past.key_findings.is_empty() {
                    past.summary.clone()
                } else {
                    past.key_findings.join("; ")
                };
                format!("{}. {}\n   {}", past.step_index + 1, past.step.sub_question, findings)
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!("Question: {}\n\nCompleted steps:\n{}", state.question, steps)
    }

    /// Draft of the last round, else every finding, else a fixed notice
    fn fallback_answer(state: &ReasoningState) -> String {
        if let Some(draft) = state.draft_answer.as_deref().filter(|d| !d.is_empty()) {
            return draft.to_string();
        }
        let findings = state.all_findings();
        if findings.is_empty() {
            NO_ANSWER.to_string()
        } else {
            findings.join("\n")
        }
    }
}

#[async_trait]
impl Node for DecideNode {
    fn name(&self) -> &str {
        DECIDE
    }

    async fn execute(&self, ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        state.iteration += 1;
        let complete = state.is_complete();
        let at_limit = state.iteration >= state.max_iterations;
        state.should_continue = !(complete || at_limit || state.evidence_sufficient);

        if state.should_continue {
            debug!(
                next_step = state.cursor() + 1,
                plan_steps = state.plan().len(),
                "continuing"
            );
            return Ok(NodeOutput::new(state));
        }

        info!(
            iteration = state.iteration,
            complete,
            at_limit,
            sufficient = state.evidence_sufficient,
            "writing final answer"
        );
        let answer = ask(
            self.generator.as_ref(),
            ctx,
            SYSTEM_PROMPT,
            Self::compose_prompt(&state),
            &self.params,
        )
        .await?;

        state.final_answer = Some(if answer.is_empty() {
            Self::fallback_answer(&state)
        } else {
            answer
        });
        Ok(NodeOutput::new(state))
    }
}

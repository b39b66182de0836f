//! Reflection over a completed round

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::orchestration::pipeline::REFLECT;
use crate::orchestration::{Node, NodeOutput, PastStep, PlanStep, ReasoningState, RunContext};
use crate::parsing::{lenient_flag, lenient_text, parse_embedded_json};
use crate::providers::TextGenerator;
use crate::steps::{ask, format_findings};
use crate::types::GenerationParams;

const SYSTEM_PROMPT: &str = "You review the outcome of one research step. \
Respond with JSON only: {\"summary\": \"...\", \"key_findings\": [\"...\"], \"sufficient\": true|false}. \
`sufficient` is true only when everything gathered so far answers the original question.";

#[derive(Debug, Default, Deserialize)]
struct Reflection {
    #[serde(default, deserialize_with = "lenient_text")]
    summary: Option<String>,
    #[serde(default, alias = "findings")]
    key_findings: Value,
    #[serde(default, alias = "is_sufficient", deserialize_with = "lenient_flag")]
    sufficient: bool,
}

/// Findings as given; a bare string stays one finding
fn findings_from(value: Value) -> Vec<String> {
    let text = |value: &Value| match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        other => text(&other).into_iter().collect(),
    }
}

/// Records the round as a past step and moves the plan forward
pub struct ReflectNode {
    generator: Arc<dyn TextGenerator>,
}

impl ReflectNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Summary, findings and sufficiency from generated text
    ///
    /// Unparsable output keeps the raw text as summary and falls back to
    /// the draft answer as the single finding.
    fn interpret(&self, text: &str, draft: Option<&str>) -> (String, Vec<String>, bool) {
        let reflection = match parse_embedded_json::<Reflection>(text) {
            Ok(reflection) => reflection,
            Err(e) => {
                warn!(error = %e, "reflection output unparsable, keeping raw text");
                Reflection {
                    summary: (!text.is_empty()).then(|| text.to_string()),
                    ..Default::default()
                }
            }
        };

        let mut findings = findings_from(reflection.key_findings);
        if findings.is_empty() {
            if let Some(draft) = draft.filter(|d| !d.is_empty()) {
                findings.push(draft.to_string());
            }
        }
        let summary = reflection
            .summary
            .or_else(|| draft.map(str::to_string))
            .unwrap_or_default();

        (summary, findings, reflection.sufficient)
    }
}

#[async_trait]
impl Node for ReflectNode {
    fn name(&self) -> &str {
        REFLECT
    }

    async fn execute(&self, ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        let step = state
            .current_step()
            .cloned()
            .unwrap_or_else(|| PlanStep::new(state.question.clone()));

        let prompt = format!(
            "Original question: {}\nStep: {}\nDraft answer: {}\nEarlier findings:\n{}",
            state.question,
            step.sub_question,
            state.draft_answer.as_deref().unwrap_or("(no answer drafted)"),
            format_findings(&state.all_findings())
        );
        let text = ask(
            self.generator.as_ref(),
            ctx,
            SYSTEM_PROMPT,
            prompt,
            &GenerationParams::structured(),
        )
        .await?;

        let (summary, key_findings, sufficient) =
            self.interpret(&text, state.draft_answer.as_deref());
        debug!(
            step = state.cursor(),
            findings = key_findings.len(),
            sufficient,
            "round reflected"
        );

        let past = PastStep {
            step_index: state.cursor(),
            step,
            documents: state.reranked.clone(),
            summary,
            key_findings,
            elapsed_ms: state.round_elapsed_ms(),
        };
        state.past_steps.push(past);
        state.evidence_sufficient = sufficient;
        state.advance();
        Ok(NodeOutput::new(state))
    }
}

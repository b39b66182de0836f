//! Reasoning step nodes
//!
//! One `Node` per pipeline role. Prompts and parsing are kept
//! simple; every step tolerates malformed generator output with a
//! documented fallback, while generator failures abort the run.

pub mod decide;
pub mod planner;
pub mod reflect;
pub mod rerank;
pub mod retrieve;
pub mod rewriter;
pub mod strategy;
pub mod synthesize;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::Result;
use crate::orchestration::{NodeRegistry, RunContext};
use crate::providers::TextGenerator;
use crate::retrieval::{RetrieverSet, StrategyKind};
use crate::schema::SchemaCache;
use crate::types::{ChatMessage, GenerationParams};

pub use decide::DecideNode;
pub use planner::PlanNode;
pub use reflect::ReflectNode;
pub use rerank::{RankedDocument, ReRankConfig, ReRanker, RankingStrategy, RerankNode};
pub use retrieve::RetrieveNode;
pub use rewriter::RewriteNode;
pub use strategy::SelectStrategyNode;
pub use synthesize::{AssembledContext, ContextBuilder, ContextConfig, SynthesizeNode};

/// Tunables shared by the step nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSettings {
    pub max_plan_steps: usize,
    pub top_k: usize,
    pub rerank_keep: usize,
    pub default_strategy: StrategyKind,
    pub context_max_tokens: usize,
    pub temperature: f32,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            max_plan_steps: 5,
            top_k: 10,
            rerank_keep: 5,
            default_strategy: StrategyKind::Hybrid,
            context_max_tokens: 2000,
            temperature: 0.2,
        }
    }
}

impl StepSettings {
    /// Parameters for free-text answers
    pub fn prose_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            ..Default::default()
        }
    }
}

/// Collaborators the steps are built from
#[derive(Clone)]
pub struct StepComponents {
    pub generator: Arc<dyn TextGenerator>,
    pub retrievers: RetrieverSet,
    pub schema_cache: Option<Arc<SchemaCache>>,
    pub settings: StepSettings,
}

/// The eight canonical nodes
pub fn default_nodes(components: &StepComponents) -> NodeRegistry {
    let settings = &components.settings;
    let generator = components.generator.clone();

    NodeRegistry::new()
        .with(Arc::new(PlanNode::new(generator.clone(), settings.max_plan_steps)))
        .with(Arc::new(RewriteNode::new(generator.clone(), settings.prose_params())))
        .with(Arc::new(SelectStrategyNode::new(
            generator.clone(),
            components.retrievers.kinds(),
            settings.default_strategy,
        )))
        .with(Arc::new(RetrieveNode::new(
            components.retrievers.clone(),
            settings.default_strategy,
            settings.top_k,
            components.schema_cache.clone(),
        )))
        .with(Arc::new(RerankNode::new(ReRanker::new(), settings.rerank_keep)))
        .with(Arc::new(SynthesizeNode::new(
            generator.clone(),
            ContextBuilder::with_config(ContextConfig {
                max_context_tokens: settings.context_max_tokens,
                ..Default::default()
            }),
            settings.prose_params(),
        )))
        .with(Arc::new(ReflectNode::new(generator.clone())))
        .with(Arc::new(DecideNode::new(generator, settings.prose_params())))
}

/// Single system + user exchange, bounded by the run deadline
pub(crate) async fn ask(
    generator: &dyn TextGenerator,
    ctx: &RunContext,
    system: &str,
    prompt: String,
    params: &GenerationParams,
) -> Result<String> {
    let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
    let generation = ctx.bounded(generator.generate(&messages, params)).await?;
    Ok(generation.text.trim().to_string())
}

/// Bullet list of findings, or a placeholder when empty
pub(crate) fn format_findings(findings: &[&str]) -> String {
    if findings.is_empty() {
        return "(none yet)".to_string();
    }
    findings
        .iter()
        .map(|finding| format!("- {}", finding))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::errors::Result;
    use crate::providers::TextGenerator;
    use crate::types::{ChatMessage, Generation, GenerationParams};

    /// Replies with a fixed text and records every user prompt
    pub struct EchoGenerator {
        reply: String,
        pub prompts: Mutex<Vec<String>>,
    }

    impl EchoGenerator {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<Generation> {
            if let Some(message) = messages.last() {
                self.prompts.lock().unwrap().push(message.content.clone());
            }
            Ok(Generation::stop(self.reply.clone()))
        }
    }
}

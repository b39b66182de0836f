//! Reasoning state threaded through the pipeline
//!
//! One value per query, owned by exactly one executor run and moved from
//! node to node. The step cursor never exceeds the plan length; the plan
//! is complete exactly when the cursor reaches it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::parsing::{lenient_indices, lenient_strings, lenient_text};
use crate::retrieval::types::RetrievedDocument;
use crate::retrieval::{SchemaFilter, StrategyKind};
use crate::schema::DocumentSchema;

/// Default reasoning-iteration limit of a fresh state
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// One sub-question of the plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(alias = "question", alias = "query")]
    pub sub_question: String,
    /// Preferred retrieval strategy, if any
    #[serde(default, deserialize_with = "lenient_text")]
    pub tool_hint: Option<String>,
    /// Structural hint matched against document schemas
    #[serde(default, deserialize_with = "lenient_text")]
    pub schema_hint: Option<String>,
    #[serde(default, alias = "expected_output", deserialize_with = "lenient_strings")]
    pub expected_outputs: Vec<String>,
    /// Indices of earlier steps this step builds on
    #[serde(default, deserialize_with = "lenient_indices")]
    pub dependencies: Vec<usize>,
}

impl PlanStep {
    pub fn new(sub_question: impl Into<String>) -> Self {
        Self {
            sub_question: sub_question.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_hint(mut self, hint: impl Into<String>) -> Self {
        self.tool_hint = Some(hint.into());
        self
    }

    pub fn with_schema_hint(mut self, hint: impl Into<String>) -> Self {
        self.schema_hint = Some(hint.into());
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<usize>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Record of one executed plan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastStep {
    pub step_index: usize,
    pub step: PlanStep,
    pub documents: Vec<RetrievedDocument>,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub elapsed_ms: u64,
}

/// Mutable state of one reasoning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningState {
    pub question: String,
    plan: Vec<PlanStep>,
    cursor: usize,
    pub past_steps: Vec<PastStep>,

    // Per-iteration scratch
    pub current_query: Option<String>,
    pub strategy: Option<StrategyKind>,
    pub retrieved: Vec<RetrievedDocument>,
    pub reranked: Vec<RetrievedDocument>,
    pub synthesized_context: String,
    pub draft_answer: Option<String>,
    pub evidence_sufficient: bool,

    /// Resolved schemas relevant to the session, keyed by document id
    pub schemas: HashMap<String, DocumentSchema>,
    pub schema_filter: Option<SchemaFilter>,

    pub should_continue: bool,
    pub iteration: usize,
    pub max_iterations: usize,
    pub final_answer: Option<String>,
    /// Terminal error; a node setting this aborts the run
    pub error: Option<String>,

    #[serde(skip)]
    round_started: Option<Instant>,
}

impl ReasoningState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            plan: Vec::new(),
            cursor: 0,
            past_steps: Vec::new(),
            current_query: None,
            strategy: None,
            retrieved: Vec::new(),
            reranked: Vec::new(),
            synthesized_context: String::new(),
            draft_answer: None,
            evidence_sufficient: false,
            schemas: HashMap::new(),
            schema_filter: None,
            should_continue: true,
            iteration: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            final_answer: None,
            error: None,
            round_started: None,
        }
    }

    /// At least one iteration is always allowed
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_schemas(mut self, schemas: HashMap<String, DocumentSchema>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn plan(&self) -> &[PlanStep] {
        &self.plan
    }

    /// Replace the plan and rewind the cursor
    pub fn set_plan(&mut self, plan: Vec<PlanStep>) {
        self.plan = plan;
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor.min(self.plan.len())
    }

    pub fn current_step(&self) -> Option<&PlanStep> {
        self.plan.get(self.cursor)
    }

    /// Move to the next plan step; saturates at the plan length
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.plan.len());
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.plan.len()
    }

    /// Reset per-iteration scratch and start timing a new round
    pub fn begin_round(&mut self) {
        self.current_query = None;
        self.strategy = None;
        self.retrieved.clear();
        self.reranked.clear();
        self.synthesized_context.clear();
        self.draft_answer = None;
        self.evidence_sufficient = false;
        self.schema_filter = None;
        self.round_started = Some(Instant::now());
    }

    /// Milliseconds since `begin_round`, 0 if no round is running
    pub fn round_elapsed_ms(&self) -> u64 {
        self.round_started
            .map(|started| u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Key findings of the given earlier steps, in step order
    pub fn findings_for(&self, dependencies: &[usize]) -> Vec<&str> {
        self.past_steps
            .iter()
            .filter(|past| dependencies.contains(&past.step_index))
            .flat_map(|past| past.key_findings.iter().map(String::as_str))
            .collect()
    }

    /// Every finding gathered so far
    pub fn all_findings(&self) -> Vec<&str> {
        self.past_steps
            .iter()
            .flat_map(|past| past.key_findings.iter().map(String::as_str))
            .collect()
    }

    /// Mark the run as failed; the executor aborts after the current node
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}

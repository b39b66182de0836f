//! Graph executor
//!
//! Walks the graph from its start node, threading one state value:
//!
//! ```text
//! loop:
//!   ctx signalled            → Timeout
//!   ++steps > ceiling        → IterationCeiling
//!   output ← node(state)     (error → NodeFailed{node})
//!   state.error set          → StateAborted{node}
//!   next ← override | edges  (0 → end, 1 → take, n → FINISH if !continue else first)
//!   stop if next = FINISH ∨ !continue ∨ (next = loop head ∧ plan complete)
//!        ∨ iteration ≥ max_iterations
//! ```
//!
//! The ceiling guards against topology defects and is independent of the
//! reasoning-iteration limit carried in the state.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::{RagError, Result};
use crate::orchestration::graph::{Graph, FINISH};
use crate::orchestration::state::ReasoningState;
use crate::telemetry::TelemetryCollector;

/// Hard bound on node executions per run
pub const MAX_NODE_EXECUTIONS: usize = 100;

/// Caller deadline and cancellation signal for one run
#[derive(Debug, Clone)]
pub struct RunContext {
    started: Instant,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// No deadline, not cancelled
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started.checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Signal cancellation to every clone of this context
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Time left before the deadline; `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn timeout_error(&self) -> RagError {
        RagError::Timeout {
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Fail with `Timeout` if cancelled or past the deadline
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() || self.is_expired() {
            return Err(self.timeout_error());
        }
        Ok(())
    }

    /// Run `fut`, failing with `Timeout` if it outlives the deadline
    pub async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        match self.remaining() {
            Some(remaining) => tokio::time::timeout(remaining, fut)
                .await
                .map_err(|_| self.timeout_error())?,
            None => fut.await,
        }
    }
}

/// Drives a graph to completion
pub struct Executor {
    graph: Graph,
    max_node_executions: usize,
    telemetry: Option<TelemetryCollector>,
}

impl Executor {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            max_node_executions: MAX_NODE_EXECUTIONS,
            telemetry: None,
        }
    }

    pub fn with_max_node_executions(mut self, limit: usize) -> Self {
        self.max_node_executions = limit;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Execute the graph and return the final state
    pub async fn run(&self, ctx: &RunContext, state: ReasoningState) -> Result<ReasoningState> {
        let run_started = Instant::now();
        let mut executions = 0usize;
        let result = self.drive(ctx, state, &mut executions).await;

        if let Some(telemetry) = &self.telemetry {
            telemetry.run_finished(executions, result.is_ok(), run_started.elapsed());
        }
        match &result {
            Ok(state) => info!(
                executions,
                iterations = state.iteration,
                "reasoning run finished"
            ),
            Err(e) => warn!(executions, error = %e, "reasoning run aborted"),
        }
        result
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        mut state: ReasoningState,
        executions: &mut usize,
    ) -> Result<ReasoningState> {
        if self.graph.is_empty() {
            return Err(RagError::Topology("graph has no nodes".to_string()));
        }
        let mut current = self
            .graph
            .start()
            .ok_or_else(|| RagError::Topology("graph has no start node".to_string()))?
            .to_string();

        loop {
            ctx.check()?;

            *executions += 1;
            if *executions > self.max_node_executions {
                return Err(RagError::IterationCeiling {
                    limit: self.max_node_executions,
                });
            }

            let node = self
                .graph
                .node(&current)
                .ok_or_else(|| RagError::Topology(format!("unknown node '{}'", current)))?
                .clone();

            debug!(node = %current, step = *executions, "executing node");
            if let Some(telemetry) = &self.telemetry {
                telemetry.node_started(&current);
            }
            let node_started = Instant::now();

            let output = match node.execute(ctx, state).await {
                Ok(output) => output,
                Err(e) => {
                    if let Some(telemetry) = &self.telemetry {
                        telemetry.node_failed(&current, &e.to_string(), node_started.elapsed());
                    }
                    return Err(RagError::in_node(current, e));
                }
            };
            state = output.state;

            if let Some(message) = &state.error {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.node_failed(&current, message, node_started.elapsed());
                }
                return Err(RagError::StateAborted {
                    node: current,
                    message: message.clone(),
                });
            }
            if let Some(telemetry) = &self.telemetry {
                telemetry.node_completed(&current, node_started.elapsed());
            }

            let next = match output.next {
                Some(next) => next,
                None => match self.graph.successors(&current) {
                    [] => {
                        debug!(node = %current, "no outgoing edges, run complete");
                        return Ok(state);
                    }
                    [only] => only.clone(),
                    [first, ..] => {
                        if state.should_continue {
                            first.clone()
                        } else {
                            FINISH.to_string()
                        }
                    }
                },
            };

            if next == FINISH || !state.should_continue {
                return Ok(state);
            }
            if self.graph.loop_head() == Some(next.as_str()) && state.is_complete() {
                debug!("plan complete at loop head");
                return Ok(state);
            }
            if state.iteration >= state.max_iterations {
                debug!(iteration = state.iteration, "reasoning iteration limit reached");
                return Ok(state);
            }
            if !self.graph.contains(&next) {
                return Err(RagError::Topology(format!(
                    "node '{}' routed to unknown node '{}'",
                    current, next
                )));
            }

            current = next;
        }
    }
}

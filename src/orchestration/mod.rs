//! Orchestration engine
//!
//! A fixed-shape directed graph of reasoning nodes driven by a bounded
//! executor. The state is a value moved through the nodes; no node ever
//! sees another run's state.

pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod state;

pub use executor::{Executor, RunContext, MAX_NODE_EXECUTIONS};
pub use graph::{Graph, Node, NodeOutput, FINISH};
pub use pipeline::{build_pipeline, NodeRegistry, PIPELINE_ORDER};
pub use state::{PastStep, PlanStep, ReasoningState, DEFAULT_MAX_ITERATIONS};

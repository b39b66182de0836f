//! Canonical reasoning pipeline
//!
//! ```text
//! plan → rewrite → select_strategy → retrieve → rerank → synthesize → reflect → decide
//!          ↑                                                                    │
//!          └────────────────────────────── continue ────────────────────────────┤
//!                                                                     finish ───┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{RagError, Result};
use crate::orchestration::graph::{Graph, Node, FINISH};

pub const PLAN: &str = "plan";
pub const REWRITE: &str = "rewrite";
pub const SELECT_STRATEGY: &str = "select_strategy";
pub const RETRIEVE: &str = "retrieve";
pub const RERANK: &str = "rerank";
pub const SYNTHESIZE: &str = "synthesize";
pub const REFLECT: &str = "reflect";
pub const DECIDE: &str = "decide";

/// Required nodes in pipeline order
pub const PIPELINE_ORDER: [&str; 8] = [
    PLAN,
    REWRITE,
    SELECT_STRATEGY,
    RETRIEVE,
    RERANK,
    SYNTHESIZE,
    REFLECT,
    DECIDE,
];

/// Named node implementations supplied by the caller
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the node's own name, replacing any previous entry
    pub fn register(&mut self, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.insert(node.name().to_string(), node);
        self
    }

    pub fn with(mut self, node: Arc<dyn Node>) -> Self {
        self.register(node);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(name).cloned()
    }

    /// Required pipeline nodes not yet registered
    pub fn missing(&self) -> Vec<&'static str> {
        PIPELINE_ORDER
            .into_iter()
            .filter(|name| !self.nodes.contains_key(*name))
            .collect()
    }
}

impl FromIterator<Arc<dyn Node>> for NodeRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Node>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for node in iter {
            registry.register(node);
        }
        registry
    }
}

/// Build the canonical eight-node graph with its single feedback edge
pub fn build_pipeline(registry: &NodeRegistry) -> Result<Graph> {
    let missing = registry.missing();
    if !missing.is_empty() {
        return Err(RagError::Topology(format!(
            "missing pipeline nodes: {}",
            missing.join(", ")
        )));
    }

    let mut graph = Graph::new();
    for name in PIPELINE_ORDER {
        let node = registry
            .get(name)
            .ok_or_else(|| RagError::Topology(format!("missing pipeline node: {}", name)))?;
        graph.add_node(node)?;
    }

    for pair in PIPELINE_ORDER.windows(2) {
        graph.add_edge(pair[0], pair[1])?;
    }
    // Listed first: taken while the state asks to continue
    graph.add_edge(DECIDE, REWRITE)?;
    graph.add_edge(DECIDE, FINISH)?;

    graph.set_start(PLAN)?;
    graph.set_loop_head(REWRITE)?;
    Ok(graph)
}

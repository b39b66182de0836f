//! Directed graph of named reasoning nodes

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{RagError, Result};
use crate::orchestration::executor::RunContext;
use crate::orchestration::state::ReasoningState;

/// Synthetic node name that ends a run
pub const FINISH: &str = "__finish__";

/// Result of executing one node
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub state: ReasoningState,
    /// Explicit routing override; `None` defers to the graph's edges
    pub next: Option<String>,
}

impl NodeOutput {
    /// Continue along the graph's edges
    pub fn new(state: ReasoningState) -> Self {
        Self { state, next: None }
    }

    /// Route to a specific node (or `FINISH`)
    pub fn goto(state: ReasoningState, next: impl Into<String>) -> Self {
        Self {
            state,
            next: Some(next.into()),
        }
    }
}

/// A reasoning step
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique, non-empty identity within a graph
    fn name(&self) -> &str;

    /// Consume the state and return the updated one
    async fn execute(&self, ctx: &RunContext, state: ReasoningState) -> Result<NodeOutput>;
}

/// Nodes, ordered outgoing edges, start node and loop head
#[derive(Clone, Default)]
pub struct Graph {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Vec<String>>,
    start: Option<String>,
    loop_head: Option<String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; empty, reserved or duplicate names are rejected
    pub fn add_node(&mut self, node: Arc<dyn Node>) -> Result<()> {
        let name = node.name().to_string();
        if name.trim().is_empty() {
            return Err(RagError::Topology("node name must not be empty".to_string()));
        }
        if name == FINISH {
            return Err(RagError::Topology(format!("node name '{}' is reserved", FINISH)));
        }
        if self.nodes.contains_key(&name) {
            return Err(RagError::Topology(format!("duplicate node '{}'", name)));
        }

        self.nodes.insert(name, node);
        Ok(())
    }

    /// Append an edge; `to` may be `FINISH`
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(RagError::Topology(format!("edge source '{}' is not registered", from)));
        }
        if to != FINISH && !self.nodes.contains_key(to) {
            return Err(RagError::Topology(format!("edge target '{}' is not registered", to)));
        }

        self.edges
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        Ok(())
    }

    pub fn set_start(&mut self, name: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(RagError::Topology(format!("start node '{}' is not registered", name)));
        }
        self.start = Some(name.to_string());
        Ok(())
    }

    /// Node whose re-entry with a completed plan ends the run
    pub fn set_loop_head(&mut self, name: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(RagError::Topology(format!("loop head '{}' is not registered", name)));
        }
        self.loop_head = Some(name.to_string());
        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Outgoing edges in insertion order
    pub fn successors(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn loop_head(&self) -> Option<&str> {
        self.loop_head.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Node for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _ctx: &RunContext, state: ReasoningState) -> Result<NodeOutput> {
            Ok(NodeOutput::new(state))
        }
    }

    #[test]
    fn test_add_node_validation() {
        let mut graph = Graph::new();
        graph.add_node(Arc::new(Named("a"))).unwrap();

        assert!(matches!(
            graph.add_node(Arc::new(Named("a"))),
            Err(RagError::Topology(_))
        ));
        assert!(graph.add_node(Arc::new(Named(""))).is_err());
        assert!(graph.add_node(Arc::new(Named(FINISH))).is_err());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_edges_require_registered_endpoints() {
        let mut graph = Graph::new();
        graph.add_node(Arc::new(Named("a"))).unwrap();
        graph.add_node(Arc::new(Named("b"))).unwrap();

        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", FINISH).unwrap();
        assert_eq!(graph.successors("a"), &["b".to_string(), FINISH.to_string()]);
        assert!(graph.successors("b").is_empty());

        assert!(graph.add_edge("a", "missing").is_err());
        assert!(graph.add_edge("missing", "a").is_err());
        assert!(graph.add_edge(FINISH, "a").is_err());
    }

    #[test]
    fn test_start_and_loop_head_must_exist() {
        let mut graph = Graph::new();
        graph.add_node(Arc::new(Named("a"))).unwrap();
        assert!(graph.set_start("b").is_err());
        assert!(graph.set_loop_head("b").is_err());
        graph.set_start("a").unwrap();
        assert_eq!(graph.start(), Some("a"));
    }
}

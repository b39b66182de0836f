//! Error types for the multi-hop reasoning engine
//!
//! One error enum covers orchestration, schema resolution, retrieval and
//! the external collaborators. Every orchestration error is fatal to the
//! run that raised it.

use thiserror::Error;

/// Main error type for the reasoning engine
#[derive(Error, Debug)]
pub enum RagError {
    /// Malformed graph construction (duplicate/missing node, bad edge endpoint)
    #[error("Graph topology error: {0}")]
    Topology(String),

    /// A node's collaborator failed; wraps the node identity
    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: Box<RagError>,
    },

    /// A node returned a state carrying a terminal error
    #[error("Node '{node}' aborted the run: {message}")]
    StateAborted { node: String, message: String },

    /// Hard bound on node executions exceeded
    #[error("Iteration ceiling exceeded: more than {limit} node executions")]
    IterationCeiling { limit: usize },

    /// Caller deadline exceeded (or run cancelled) at a node boundary
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Schema resolution failed with no further fallback
    #[error("Schema resolution failed: {0}")]
    Resolution(String),

    /// Retrieval strategy failure not attributable to a collaborator
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Embedding provider errors
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Vector store errors
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Text generation provider errors
    #[error("Text generation failed: {0}")]
    Generation(String),

    /// JSON parsing errors
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic errors with context
    #[error("Error: {0}")]
    Generic(String),
}

impl RagError {
    /// Wrap an error with the identity of the node that produced it
    pub fn in_node(node: impl Into<String>, source: RagError) -> Self {
        RagError::NodeFailed {
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// Name of the failing node, if this error came out of one
    pub fn node(&self) -> Option<&str> {
        match self {
            RagError::NodeFailed { node, .. } | RagError::StateAborted { node, .. } => Some(node),
            _ => None,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, RagError>;

/// Convert anyhow errors to RagError
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Generic(format!("{:#}", err))
    }
}

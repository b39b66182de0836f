//! multihop-rag - Iterative multi-hop question answering
//!
//! A planner decomposes a question into dependent sub-questions; each
//! round rewrites, retrieves, re-ranks, synthesizes and reflects until the
//! plan is complete, the evidence suffices or the iteration limit is hit.
//!
//! # Architecture
//!
//! - **Orchestration**: reasoning state, node graph, bounded executor
//! - **Schema**: per-document structure via explicit input, cache, patterns or analysis
//! - **Retrieval**: vector, BM25 lexical, RRF hybrid and schema-filtered strategies
//! - **Steps**: the eight reasoning nodes wired by `engine::QueryEngine`

pub mod errors;
pub mod types;
pub mod parsing;
pub mod providers;
pub mod telemetry;
pub mod config;
pub mod cli;

pub mod retrieval;
pub mod schema;
pub mod orchestration;
pub mod steps;

pub mod ingest;
pub mod engine;

// Re-export commonly used types
pub use engine::{EngineParts, QueryEngine};
pub use errors::{RagError, Result};

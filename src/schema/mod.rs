//! Schema resolution engine
//!
//! Determines a per-document structural description used for chunking and
//! filtered retrieval.
//!
//! Components:
//! - Types: document schema, patterns, resolution results
//! - Registry: reusable pattern templates, loadable from disk
//! - Cache: TTL memo of resolutions
//! - Analyzer: structural analysis collaborator
//! - Resolver: explicit → cache → pattern → analysis
//! - Chunking: schema-guided chunk boundaries and metadata overlays

pub mod analyzer;
pub mod cache;
pub mod chunking;
pub mod registry;
pub mod resolver;
pub mod types;

pub use analyzer::{LlmStructureAnalyzer, StructureAnalyzer};
pub use cache::SchemaCache;
pub use chunking::SchemaChunker;
pub use registry::PatternRegistry;
pub use resolver::{ResolveRequest, SchemaResolver};
pub use types::{
    DocumentSchema, HierarchyNode, HierarchyTree, OffsetRange, ResolutionResult,
    ResolutionStrategy, SchemaPattern, Section, SemanticRegion,
};

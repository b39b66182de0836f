//! Retrieval fusion subsystem
//!
//! Four interchangeable strategies behind one contract:
//! - Vector: embed the query, similarity search
//! - Lexical: BM25 over an over-sized candidate scan
//! - Hybrid: vector + lexical fused with Reciprocal Rank Fusion
//! - Schema: vector search narrowed by schema-derived predicates

pub mod bm25;
pub mod fusion;
pub mod hybrid;
pub mod lexical;
pub mod schema_filter;
pub mod types;
pub mod vector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{RagError, Result};
use crate::providers::{Embedder, VectorStore};

pub use bm25::{tokenize, Bm25Scorer};
pub use fusion::{RankFuser, RRF_K};
pub use hybrid::HybridRetriever;
pub use lexical::LexicalRetriever;
pub use schema_filter::{SchemaFilter, SchemaFilteredRetriever};
pub use types::{FilterCondition, MetadataFilter, RetrievedDocument};
pub use vector::VectorRetriever;

/// Retrieval strategy identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Vector,
    Lexical,
    Hybrid,
    Schema,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Vector,
        StrategyKind::Lexical,
        StrategyKind::Hybrid,
        StrategyKind::Schema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Vector => "vector",
            StrategyKind::Lexical => "lexical",
            StrategyKind::Hybrid => "hybrid",
            StrategyKind::Schema => "schema",
        }
    }

    /// Lenient parse: accepts common aliases and surrounding punctuation
    pub fn parse(text: &str) -> Option<Self> {
        let word = text
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .to_lowercase();
        match word.as_str() {
            "vector" | "semantic" | "dense" => Some(StrategyKind::Vector),
            "lexical" | "bm25" | "keyword" => Some(StrategyKind::Lexical),
            "hybrid" | "rrf" | "fusion" => Some(StrategyKind::Hybrid),
            "schema" | "schema_filtered" | "structured" => Some(StrategyKind::Schema),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| RagError::ConfigError(format!("unknown strategy: {}", s)))
    }
}

/// Filter argument shared by every strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Plain metadata predicates, honoured by every strategy
    pub metadata: MetadataFilter,
    /// Schema-derived predicates, honoured by the schema strategy
    pub schema: Option<SchemaFilter>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: MetadataFilter) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_schema(mut self, schema: Option<SchemaFilter>) -> Self {
        self.schema = schema;
        self
    }
}

/// Uniform retrieval contract
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Ranked documents, at most `top_k`
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedDocument>>;
}

/// Strategies available to a run, keyed by kind
#[derive(Clone, Default)]
pub struct RetrieverSet {
    strategies: HashMap<StrategyKind, Arc<dyn RetrievalStrategy>>,
}

impl RetrieverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four strategies over one embedder and store
    pub fn standard(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        fuser: RankFuser,
    ) -> Self {
        let vector = VectorRetriever::new(embedder, store.clone());
        let lexical = LexicalRetriever::new(store);

        let mut set = Self::new();
        set.insert(Arc::new(vector.clone()));
        set.insert(Arc::new(lexical.clone()));
        set.insert(Arc::new(HybridRetriever::new(vector.clone(), lexical, fuser)));
        set.insert(Arc::new(SchemaFilteredRetriever::new(vector)));
        set
    }

    /// Register a strategy, replacing any of the same kind
    pub fn insert(&mut self, strategy: Arc<dyn RetrievalStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn RetrievalStrategy>> {
        self.strategies.get(&kind).cloned()
    }

    /// Registered kinds in canonical order
    pub fn kinds(&self) -> Vec<StrategyKind> {
        StrategyKind::ALL
            .into_iter()
            .filter(|kind| self.strategies.contains_key(kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemoryVectorStore;

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!(StrategyKind::parse("Hybrid."), Some(StrategyKind::Hybrid));
        assert_eq!(StrategyKind::parse(" bm25 "), Some(StrategyKind::Lexical));
        assert_eq!(StrategyKind::parse("\"schema\""), Some(StrategyKind::Schema));
        assert_eq!(StrategyKind::parse("graph"), None);
        assert!("nope".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_strategy_kind_serde() {
        let json = serde_json::to_string(&StrategyKind::Lexical).unwrap();
        assert_eq!(json, "\"lexical\"");
    }

    #[test]
    fn test_standard_set_has_all_kinds() {
        let set = RetrieverSet::standard(
            Arc::new(NullEmbedder),
            Arc::new(InMemoryVectorStore::new()),
            RankFuser::default(),
        );
        assert_eq!(set.kinds(), StrategyKind::ALL.to_vec());
        for kind in StrategyKind::ALL {
            assert_eq!(set.get(kind).map(|s| s.kind()), Some(kind));
        }
    }
}

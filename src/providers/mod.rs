//! External collaborator capabilities
//!
//! The core only depends on the three traits below. Implementations:
//! - `InMemoryVectorStore`: cosine similarity over an in-process corpus
//! - `OllamaClient`: text generation + embeddings over the Ollama HTTP API
//! - `QdrantStore`: Qdrant-backed vector store
//! - `LocalEmbedder`: Candle BERT embeddings computed in-process

pub mod local_embed;
pub mod memory;
pub mod ollama;
pub mod qdrant;
pub mod retry;

use async_trait::async_trait;

use crate::errors::Result;
use crate::retrieval::types::{MetadataFilter, RetrievedDocument};
use crate::types::{ChatMessage, Generation, GenerationParams};

pub use local_embed::LocalEmbedder;
pub use memory::InMemoryVectorStore;
pub use ollama::OllamaClient;
pub use qdrant::QdrantStore;
pub use retry::RetryManager;

/// Text generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for an ordered list of role-tagged messages
    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Generation>;
}

/// Embedding capability
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One fixed-dimension vector per input text; fails on an empty batch
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimension of every returned vector
    fn dimension(&self) -> usize;
}

/// Similarity search request against a vector store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// Query vector; `None` requests a filter-only scan with zero scores
    pub vector: Option<Vec<f32>>,
    /// Maximum number of results
    pub limit: usize,
    /// Metadata predicates every result must satisfy
    pub filter: MetadataFilter,
    /// Minimum similarity score
    pub min_score: Option<f32>,
}

impl SearchRequest {
    pub fn similar_to(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector: Some(vector),
            limit,
            ..Default::default()
        }
    }

    pub fn scan(limit: usize) -> Self {
        Self {
            vector: None,
            limit,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }
}

/// Vector store capability
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ranked documents (descending score) matching the request
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedDocument>>;

    /// Insert or replace documents; each must carry an embedding
    async fn upsert(&self, documents: Vec<RetrievedDocument>) -> Result<()>;

    /// Delete documents by identifier
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Number of stored documents
    async fn count(&self) -> Result<u64>;
}

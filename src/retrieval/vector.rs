//! Dense vector retrieval

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::providers::{Embedder, SearchRequest, VectorStore};
use crate::retrieval::types::{MetadataFilter, RetrievedDocument};
use crate::retrieval::{RetrievalStrategy, SearchFilter, StrategyKind};

/// Embeds the query and runs a similarity search
#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed `query` as a single-item batch
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("embedder returned no vector".to_string()))
    }

    /// Similarity search with explicit filter and score floor
    pub async fn search_filtered(
        &self,
        query: &str,
        top_k: usize,
        filter: MetadataFilter,
        min_score: Option<f32>,
    ) -> Result<Vec<RetrievedDocument>> {
        let vector = self.embed_query(query).await?;
        let request = SearchRequest::similar_to(vector, top_k)
            .with_filter(filter)
            .with_min_score(min_score);

        let results = self.store.search(&request).await?;
        debug!(results = results.len(), top_k, "vector search");
        Ok(results)
    }
}

#[async_trait]
impl RetrievalStrategy for VectorRetriever {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vector
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedDocument>> {
        self.search_filtered(query, top_k, filter.metadata.clone(), None)
            .await
    }
}

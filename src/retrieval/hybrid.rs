//! Hybrid retrieval: vector + lexical fused by Reciprocal Rank Fusion

use async_trait::async_trait;
use tracing::debug;

use crate::errors::Result;
use crate::retrieval::fusion::RankFuser;
use crate::retrieval::lexical::LexicalRetriever;
use crate::retrieval::types::RetrievedDocument;
use crate::retrieval::vector::VectorRetriever;
use crate::retrieval::{RetrievalStrategy, SearchFilter, StrategyKind};

/// Runs both searches at `2 × top_k` and fuses their ranks
#[derive(Clone)]
pub struct HybridRetriever {
    vector: VectorRetriever,
    lexical: LexicalRetriever,
    fuser: RankFuser,
}

impl HybridRetriever {
    pub fn new(vector: VectorRetriever, lexical: LexicalRetriever, fuser: RankFuser) -> Self {
        Self {
            vector,
            lexical,
            fuser,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for HybridRetriever {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedDocument>> {
        let fetch = top_k.saturating_mul(2);

        let (dense, sparse) = tokio::try_join!(
            self.vector
                .search_filtered(query, fetch, filter.metadata.clone(), None),
            self.lexical
                .search_filtered(query, fetch, filter.metadata.clone()),
        )?;

        debug!(
            vector = dense.len(),
            lexical = sparse.len(),
            "fusing ranked lists"
        );
        Ok(self.fuser.fuse(&[dense, sparse], top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RagError;
    use crate::providers::{Embedder, InMemoryVectorStore};
    use std::sync::Arc;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Embedding("offline".to_string()))
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn hybrid(embedder: Arc<dyn Embedder>) -> HybridRetriever {
        let store = Arc::new(InMemoryVectorStore::with_documents(vec![
            // Closest vector, no lexical match
            RetrievedDocument::new("v", "unrelated prose").with_embedding(vec![1.0, 0.0]),
            // Lexical match, middling vector
            RetrievedDocument::new("both", "ownership rules").with_embedding(vec![0.8, 0.6]),
            // Lexical match, far vector
            RetrievedDocument::new("l", "ownership ownership").with_embedding(vec![0.0, 1.0]),
        ]));
        HybridRetriever::new(
            VectorRetriever::new(embedder, store.clone()),
            LexicalRetriever::new(store),
            RankFuser::default(),
        )
    }

    #[tokio::test]
    async fn test_hybrid_fuses_both_lists() {
        let results = hybrid(Arc::new(ConstEmbedder))
            .search("ownership", 3, &SearchFilter::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        // Every document is in the vector list; the two lexical matches gain
        // a second contribution and outrank the vector-only document.
        assert_ne!(results[2].id, "both");
        assert_eq!(results[2].id, "v");
    }

    #[tokio::test]
    async fn test_hybrid_propagates_embedding_error() {
        let err = hybrid(Arc::new(BrokenEmbedder))
            .search("ownership", 3, &SearchFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }
}

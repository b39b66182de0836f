//! Lexical (BM25) retrieval

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::providers::{SearchRequest, VectorStore};
use crate::retrieval::bm25::{tokenize, Bm25Scorer};
use crate::retrieval::types::{MetadataFilter, RetrievedDocument};
use crate::retrieval::{RetrievalStrategy, SearchFilter, StrategyKind};

/// Minimum candidate set size fetched from the store
pub const MIN_CANDIDATES: usize = 100;
/// Candidate set multiplier over `top_k`
pub const CANDIDATE_MULTIPLIER: usize = 10;

/// Candidate set size for a given `top_k`
pub fn candidate_limit(top_k: usize) -> usize {
    (top_k.saturating_mul(CANDIDATE_MULTIPLIER)).max(MIN_CANDIDATES)
}

/// Scores a filtered candidate scan with BM25
#[derive(Clone)]
pub struct LexicalRetriever {
    store: Arc<dyn VectorStore>,
    scorer: Bm25Scorer,
}

impl LexicalRetriever {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self::with_scorer(store, Bm25Scorer::default())
    }

    pub fn with_scorer(store: Arc<dyn VectorStore>, scorer: Bm25Scorer) -> Self {
        Self { store, scorer }
    }

    pub async fn search_filtered(
        &self,
        query: &str,
        top_k: usize,
        filter: MetadataFilter,
    ) -> Result<Vec<RetrievedDocument>> {
        let terms = tokenize(query);
        if terms.is_empty() {
            debug!("lexical query has no scorable terms");
            return Ok(Vec::new());
        }

        let request = SearchRequest::scan(candidate_limit(top_k)).with_filter(filter);
        let candidates = self.store.search(&request).await?;
        let candidate_count = candidates.len();

        let ranked = self.scorer.rank(&terms, candidates, top_k);
        debug!(
            candidates = candidate_count,
            results = ranked.len(),
            "lexical search"
        );
        Ok(ranked)
    }
}

#[async_trait]
impl RetrievalStrategy for LexicalRetriever {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lexical
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedDocument>> {
        self.search_filtered(query, top_k, filter.metadata.clone())
            .await
    }
}

//! Re-ranking of retrieved documents
//!
//! Strategy scores live on different scales (cosine, BM25 weight, RRF), so
//! the base score is first normalised by the best score of the batch.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::orchestration::pipeline::RERANK;
use crate::orchestration::{Node, NodeOutput, ReasoningState, RunContext};
use crate::retrieval::RetrievedDocument;

/// Metadata key holding a unix timestamp in seconds
pub const META_TIMESTAMP: &str = "timestamp";

/// Re-ranking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    /// Normalised retrieval score only
    Similarity,
    /// Recency only
    Recency,
    /// Normalised score, recency and keyword boost combined
    Hybrid,
}

/// Re-ranking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReRankConfig {
    pub strategy: RankingStrategy,
    /// Weight for recency (0.0 to 1.0) in hybrid mode
    pub recency_weight: f32,
    /// Upper bound of the exact keyword match boost
    pub keyword_boost: f32,
}

impl Default for ReRankConfig {
    fn default() -> Self {
        Self {
            strategy: RankingStrategy::Hybrid,
            recency_weight: 0.3,
            keyword_boost: 0.1,
        }
    }
}

/// Document with re-ranked score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDocument {
    pub document: RetrievedDocument,
    pub original_score: f32,
    pub reranked_score: f32,
    pub boost_applied: f32,
}

/// Re-ranker for retrieval results
#[derive(Debug, Clone, Default)]
pub struct ReRanker {
    config: ReRankConfig,
}

impl ReRanker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReRankConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReRankConfig {
        &self.config
    }

    /// Re-rank documents, best first; equal scores keep retrieval order
    pub fn rerank(&self, documents: Vec<RetrievedDocument>, query: &str) -> Vec<RankedDocument> {
        let max_score = documents
            .iter()
            .map(|doc| doc.score)
            .fold(0.0f32, f32::max);
        let now = Utc::now().timestamp();

        let mut ranked: Vec<RankedDocument> = documents
            .into_iter()
            .map(|doc| {
                let original_score = doc.score;
                let base = if max_score > 0.0 {
                    (doc.score / max_score).max(0.0)
                } else {
                    0.0
                };
                let reranked_score = self.compute_score(&doc, base, query, now);

                RankedDocument {
                    document: doc,
                    original_score,
                    reranked_score,
                    boost_applied: reranked_score - base,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.reranked_score.total_cmp(&a.reranked_score));
        ranked
    }

    fn compute_score(&self, doc: &RetrievedDocument, base: f32, query: &str, now: i64) -> f32 {
        match self.config.strategy {
            RankingStrategy::Similarity => base,
            RankingStrategy::Recency => recency_score(doc, now),
            RankingStrategy::Hybrid => {
                let recency = recency_score(doc, now);
                let boost = self.keyword_boost(doc, query);
                let similarity_weight = 1.0 - self.config.recency_weight;

                (base * similarity_weight + recency * self.config.recency_weight + boost).min(1.0)
            }
        }
    }

    /// Boost proportional to the share of query words found verbatim
    fn keyword_boost(&self, doc: &RetrievedDocument, query: &str) -> f32 {
        let query = query.to_lowercase();
        let content = doc.content.to_lowercase();
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.is_empty() {
            return 0.0;
        }

        let matches = words
            .iter()
            .filter(|word| word.len() > 3 && content.contains(*word))
            .count();
        let per_match = self.config.keyword_boost / words.len() as f32;
        (matches as f32 * per_match).min(self.config.keyword_boost)
    }
}

/// Exponential decay over a 30-day scale; 0.5 when no timestamp is known
fn recency_score(doc: &RetrievedDocument, now: i64) -> f32 {
    match doc.metadata.get(META_TIMESTAMP).and_then(|v| v.as_i64()) {
        Some(timestamp) => {
            let age_days = (now - timestamp).max(0) as f32 / 86_400.0;
            (-age_days / 30.0).exp()
        }
        None => 0.5,
    }
}

/// Keeps the best documents of the round
pub struct RerankNode {
    reranker: ReRanker,
    keep: usize,
}

impl RerankNode {
    pub fn new(reranker: ReRanker, keep: usize) -> Self {
        Self {
            reranker,
            keep: keep.max(1),
        }
    }
}

#[async_trait]
impl Node for RerankNode {
    fn name(&self) -> &str {
        RERANK
    }

    async fn execute(&self, _ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        let query = state
            .current_query
            .clone()
            .unwrap_or_else(|| state.question.clone());
        let candidates = state.retrieved.len();

        state.reranked = self
            .reranker
            .rerank(state.retrieved.clone(), &query)
            .into_iter()
            .take(self.keep)
            .map(|ranked| {
                let score = ranked.reranked_score;
                ranked.document.with_score(score)
            })
            .collect();

        debug!(kept = state.reranked.len(), candidates, "documents re-ranked");
        Ok(NodeOutput::new(state))
    }
}

//! Reciprocal Rank Fusion
//!
//! Each list contributes `1 / (rank + k)` per document it contains, with
//! 1-indexed ranks. A document in only one list keeps that single
//! contribution.

use std::collections::HashMap;

use crate::retrieval::types::RetrievedDocument;

/// Standard RRF constant
pub const RRF_K: f64 = 60.0;

/// Combines ranked lists into one by reciprocal-rank aggregation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankFuser {
    k: f64,
}

impl Default for RankFuser {
    fn default() -> Self {
        Self { k: RRF_K }
    }
}

impl RankFuser {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Fused score of a document at each given 1-indexed rank
    pub fn contribution(&self, rank: usize) -> f64 {
        1.0 / (rank as f64 + self.k)
    }

    /// Fuse ranked lists, keyed by document id
    ///
    /// The first occurrence of a document supplies its content and metadata.
    /// Equal fused scores keep first-seen order. `score` is overwritten with
    /// the fused score.
    pub fn fuse(&self, lists: &[Vec<RetrievedDocument>], top_k: usize) -> Vec<RetrievedDocument> {
        let mut order: Vec<String> = Vec::new();
        let mut docs: HashMap<String, RetrievedDocument> = HashMap::new();
        let mut scores: HashMap<String, f64> = HashMap::new();

        for list in lists {
            let mut ranked_in_list: HashMap<&str, usize> = HashMap::new();
            for (index, doc) in list.iter().enumerate() {
                // Duplicates inside one list count at their best rank only
                ranked_in_list.entry(doc.id.as_str()).or_insert(index + 1);
            }

            for doc in list {
                let Some(rank) = ranked_in_list.remove(doc.id.as_str()) else {
                    continue;
                };
                *scores.entry(doc.id.clone()).or_insert(0.0) += self.contribution(rank);
                if !docs.contains_key(&doc.id) {
                    order.push(doc.id.clone());
                    docs.insert(doc.id.clone(), doc.clone());
                }
            }
        }

        let mut fused: Vec<(f64, RetrievedDocument)> = order
            .into_iter()
            .filter_map(|id| {
                let score = scores.get(&id).copied()?;
                let doc = docs.remove(&id)?;
                Some((score, doc))
            })
            .collect();

        // Stable sort keeps first-seen order on ties
        fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(top_k);

        fused
            .into_iter()
            .map(|(score, mut doc)| {
                doc.score = score as f32;
                doc
            })
            .collect()
    }
}

//! In-process vector store
//!
//! Exhaustive cosine-similarity search with metadata filtering. Suitable
//! for tests and small corpora; ties keep insertion order.

use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

use crate::errors::{RagError, Result};
use crate::providers::{SearchRequest, VectorStore};
use crate::retrieval::types::RetrievedDocument;

/// Vector store holding every document in memory
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    documents: RwLock<Vec<RetrievedDocument>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with documents
    pub fn with_documents(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }

    fn snapshot(&self) -> Vec<RetrievedDocument> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cosine similarity; zero-norm or mismatched vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedDocument>> {
        let mut results: Vec<RetrievedDocument> = self
            .snapshot()
            .into_iter()
            .filter(|doc| request.filter.matches(doc))
            .map(|mut doc| {
                doc.score = match (&request.vector, &doc.embedding) {
                    (Some(query), Some(embedding)) => cosine_similarity(query, embedding),
                    _ => 0.0,
                };
                doc
            })
            .filter(|doc| request.min_score.map_or(true, |min| doc.score >= min))
            .collect();

        if request.vector.is_some() {
            // Stable sort keeps insertion order among equal scores
            results.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        results.truncate(request.limit);

        Ok(results)
    }

    async fn upsert(&self, documents: Vec<RetrievedDocument>) -> Result<()> {
        if let Some(missing) = documents.iter().find(|doc| doc.embedding.is_none()) {
            return Err(RagError::VectorStore(format!(
                "document '{}' has no embedding",
                missing.id
            )));
        }

        let mut stored = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        for doc in documents {
            match stored.iter_mut().find(|existing| existing.id == doc.id) {
                Some(existing) => *existing = doc,
                None => stored.push(doc),
            }
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|doc| !ids.contains(&doc.id));
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64)
    }
}

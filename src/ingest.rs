//! Bulk document ingestion
//!
//! resolve schema → chunk → embed → upsert, one document at a time but all
//! documents concurrently. A failing document is reported and never
//! affects its siblings.

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{RagError, Result};
use crate::providers::{Embedder, VectorStore};
use crate::retrieval::RetrievedDocument;
use crate::schema::{ResolutionStrategy, ResolveRequest, SchemaChunker, SchemaResolver};
use crate::steps::rerank::META_TIMESTAMP;

/// Chunks embedded per embedder call
pub const DEFAULT_EMBED_BATCH: usize = 32;

/// A successfully ingested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedDocument {
    pub document_id: String,
    pub strategy: ResolutionStrategy,
    pub pattern_name: Option<String>,
    pub chunks: usize,
}

/// A document that could not be ingested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub document_id: String,
    pub error: String,
}

/// Outcome of one ingestion batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub succeeded: Vec<IngestedDocument>,
    pub failed: Vec<IngestFailure>,
    /// Total chunks written
    pub chunks: usize,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Read a file as an ingestion request; the id is the file stem
pub fn document_from_path(path: &Path) -> Result<ResolveRequest> {
    let content = std::fs::read_to_string(path)?;
    let document_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| RagError::Generic(format!("invalid document path: {}", path.display())))?;
    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("md") | Some("markdown") => "markdown",
        Some("html") | Some("htm") => "html",
        Some("json") => "json",
        _ => "text",
    };

    Ok(ResolveRequest::new(document_id, content, format))
}

/// Writes schema-guided chunks into a vector store
pub struct Ingestor {
    resolver: Arc<SchemaResolver>,
    chunker: SchemaChunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    embed_batch: usize,
}

impl Ingestor {
    pub fn new(
        resolver: Arc<SchemaResolver>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            resolver,
            chunker: SchemaChunker::default(),
            embedder,
            store,
            embed_batch: DEFAULT_EMBED_BATCH,
        }
    }

    pub fn with_chunker(mut self, chunker: SchemaChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_embed_batch(mut self, size: usize) -> Self {
        self.embed_batch = size.max(1);
        self
    }

    /// Ingest every document; failures are collected, not propagated
    pub async fn ingest(&self, documents: Vec<ResolveRequest>) -> IngestReport {
        let outcomes = join_all(documents.into_iter().map(|document| async move {
            let document_id = document.document_id.clone();
            (document_id, self.ingest_one(document).await)
        }))
        .await;

        let mut report = IngestReport::default();
        for (document_id, outcome) in outcomes {
            match outcome {
                Ok(ingested) => {
                    report.chunks += ingested.chunks;
                    report.succeeded.push(ingested);
                }
                Err(e) => {
                    warn!(document = %document_id, error = %e, "ingestion failed");
                    report.failed.push(IngestFailure {
                        document_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            chunks = report.chunks,
            "ingestion finished"
        );
        report
    }

    async fn ingest_one(&self, document: ResolveRequest) -> Result<IngestedDocument> {
        let resolution = self
            .resolver
            .resolve(
                &document.document_id,
                &document.content,
                &document.format,
                document.explicit,
            )
            .await?;

        let timestamp = Utc::now().timestamp();
        let mut chunks: Vec<RetrievedDocument> = self
            .chunker
            .chunk(&document.content, &resolution.schema)
            .into_iter()
            .map(|chunk| chunk.with_metadata(META_TIMESTAMP, timestamp))
            .collect();

        for batch in chunks.chunks_mut(self.embed_batch) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                chunk.embedding = Some(embedding);
            }
        }

        let count = chunks.len();
        if count > 0 {
            self.store.upsert(chunks).await?;
        }

        Ok(IngestedDocument {
            document_id: document.document_id,
            strategy: resolution.strategy,
            pattern_name: resolution.pattern_name,
            chunks: count,
        })
    }
}

//! Deterministic collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use multihop_rag::errors::{RagError, Result};
use multihop_rag::providers::{Embedder, InMemoryVectorStore, TextGenerator};
use multihop_rag::retrieval::{tokenize, RetrievedDocument};
use multihop_rag::schema::{DocumentSchema, StructureAnalyzer};
use multihop_rag::types::{ChatMessage, Generation, GenerationParams};

/// Replies chosen by the first rule whose needle occurs in the system prompt
///
/// Each rule's replies are consumed in order; the last one repeats.
pub struct ScriptedGenerator {
    rules: Mutex<Vec<(String, Vec<String>, usize)>>,
    default_reply: String,
    pub calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(default_reply: &str) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_reply: default_reply.to_string(),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn on(self, needle: &str, replies: &[&str]) -> Self {
        self.rules.lock().unwrap().push((
            needle.to_string(),
            replies.iter().map(|r| r.to_string()).collect(),
            0,
        ));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// User prompts sent under system prompts containing `needle`
    pub fn prompts_for(&self, needle: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(system, _)| system.contains(needle))
            .map(|(_, user)| user.clone())
            .collect()
    }

    fn reply_for(&self, system: &str) -> String {
        let mut rules = self.rules.lock().unwrap();
        for (needle, replies, next) in rules.iter_mut() {
            if system.contains(needle.as_str()) && !replies.is_empty() {
                let reply = replies[(*next).min(replies.len() - 1)].clone();
                *next += 1;
                return reply;
            }
        }
        self.default_reply.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, messages: &[ChatMessage], _params: &GenerationParams) -> Result<Generation> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let system = messages.first().map(|m| m.content.clone()).unwrap_or_default();
        let user = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let reply = self.reply_for(&system);
        self.calls.lock().unwrap().push((system, user));
        Ok(Generation::stop(reply))
    }
}

/// Always fails
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _messages: &[ChatMessage], _params: &GenerationParams) -> Result<Generation> {
        Err(RagError::Generation("model offline".to_string()))
    }
}

/// Bag-of-words feature hashing, L2-normalised
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimension] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(RagError::Embedding("empty batch".to_string()));
        }
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Returns a fixed schema (or fails) and counts invocations
pub struct CountingAnalyzer {
    calls: AtomicUsize,
    schema: Option<DocumentSchema>,
}

impl CountingAnalyzer {
    pub fn returning(schema: DocumentSchema) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            schema: Some(schema),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            schema: None,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructureAnalyzer for CountingAnalyzer {
    async fn analyze(&self, document_id: &str, _content: &str, format: &str) -> Result<DocumentSchema> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.schema {
            Some(schema) => {
                let mut schema = schema.clone();
                schema.document_id = document_id.to_string();
                schema.format = format.to_string();
                Ok(schema)
            }
            None => Err(RagError::Resolution("analysis unavailable".to_string())),
        }
    }
}

/// Chunk with an embedding from `embedder`
pub fn chunk(embedder: &HashingEmbedder, id: &str, document_id: &str, content: &str) -> RetrievedDocument {
    RetrievedDocument::new(id, content)
        .with_metadata("document_id", document_id)
        .with_embedding(embedder.vector(content))
}

/// Small two-document corpus about a company and its founder
pub fn founder_corpus(embedder: &HashingEmbedder) -> Arc<InMemoryVectorStore> {
    Arc::new(InMemoryVectorStore::with_documents(vec![
        chunk(embedder, "acme#0", "acme", "Acme Corporation was founded by Ada Lovelace in 1990.")
            .with_metadata("section_type", "history"),
        chunk(embedder, "acme#1", "acme", "Acme sells rocket skates and anvils worldwide.")
            .with_metadata("section_type", "products"),
        chunk(embedder, "ada#0", "ada", "Ada Lovelace was born in London and studied mathematics.")
            .with_metadata("section_type", "biography"),
        chunk(embedder, "misc#0", "misc", "Unrelated note about gardening and tomatoes.")
            .with_metadata("section_type", "notes"),
    ]))
}

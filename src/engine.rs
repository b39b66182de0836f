//! Query engine
//!
//! Wires configuration and collaborators into a runnable reasoning
//! pipeline. Every `answer` call gets its own `ReasoningState`; the only
//! state shared between queries is the schema cache and the session's
//! resolved schemas.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{RagError, Result};
use crate::ingest::{IngestReport, Ingestor};
use crate::orchestration::{build_pipeline, Executor, ReasoningState, RunContext};
use crate::providers::{Embedder, LocalEmbedder, OllamaClient, QdrantStore, TextGenerator, VectorStore};
use crate::retrieval::{RankFuser, RetrieverSet};
use crate::schema::{
    DocumentSchema, LlmStructureAnalyzer, PatternRegistry, ResolveRequest, SchemaCache,
    SchemaResolver, StructureAnalyzer,
};
use crate::steps::{default_nodes, StepComponents};
use crate::telemetry::TelemetryCollector;

/// Collaborators an engine is assembled from
#[derive(Clone)]
pub struct EngineParts {
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub registry: Arc<PatternRegistry>,
    /// Structure analyzer; defaults to generator-backed analysis
    pub analyzer: Option<Arc<dyn StructureAnalyzer>>,
}

/// Multi-hop question answering over an ingested corpus
pub struct QueryEngine {
    config: Config,
    resolver: Arc<SchemaResolver>,
    ingestor: Ingestor,
    executor: Executor,
    telemetry: TelemetryCollector,
    session_schemas: RwLock<HashMap<String, DocumentSchema>>,
}

impl QueryEngine {
    /// Assemble an engine from explicit collaborators
    pub fn new(config: Config, parts: EngineParts) -> Result<Self> {
        let analyzer = parts.analyzer.unwrap_or_else(|| {
            Arc::new(
                LlmStructureAnalyzer::new(parts.generator.clone())
                    .with_max_chars(config.schema.max_analysis_chars),
            )
        });
        let cache = Arc::new(SchemaCache::new(config.cache_ttl()));
        let resolver = Arc::new(
            SchemaResolver::new(parts.registry, cache.clone(), analyzer)
                .with_match_threshold(config.schema.match_threshold),
        );

        let retrievers = RetrieverSet::standard(
            parts.embedder.clone(),
            parts.store.clone(),
            RankFuser::new(config.retrieval.rrf_k),
        );
        let components = StepComponents {
            generator: parts.generator,
            retrievers,
            schema_cache: Some(cache),
            settings: config.step_settings(),
        };
        let graph = build_pipeline(&default_nodes(&components))?;

        let telemetry = TelemetryCollector::new();
        let executor = Executor::new(graph).with_telemetry(telemetry.clone());
        let ingestor = Ingestor::new(resolver.clone(), parts.embedder, parts.store);

        Ok(Self {
            config,
            resolver,
            ingestor,
            executor,
            telemetry,
            session_schemas: RwLock::new(HashMap::new()),
        })
    }

    /// Connect Ollama and Qdrant as configured
    pub async fn from_config(config: Config) -> Result<Self> {
        let ollama = Arc::new(
            OllamaClient::with_timeout(
                &config.ollama.url,
                &config.ollama.chat_model,
                &config.ollama.embed_model,
                config.request_timeout(),
            )?
            .with_embed_dimension(config.qdrant.dimension),
        );

        let embedder: Arc<dyn Embedder> = if config.ollama.local_embeddings {
            Arc::new(LocalEmbedder::new()?)
        } else {
            ollama.clone()
        };
        if embedder.dimension() != config.qdrant.dimension {
            return Err(RagError::ConfigError(format!(
                "embedding dimension {} does not match collection dimension {}",
                embedder.dimension(),
                config.qdrant.dimension
            )));
        }

        let store = Arc::new(
            QdrantStore::connect(
                &config.qdrant.url,
                &config.qdrant.collection,
                config.qdrant.dimension,
            )
            .await?,
        );

        let registry = Arc::new(PatternRegistry::with_defaults());
        if let Some(dir) = &config.schema.patterns_dir {
            load_patterns(&registry, dir);
        }

        Self::new(
            config,
            EngineParts {
                generator: ollama,
                embedder,
                store,
                registry,
                analyzer: None,
            },
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    /// Make a resolved schema available to subsequent queries
    pub fn add_session_schema(&self, schema: DocumentSchema) {
        self.session_schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.document_id.clone(), schema);
    }

    pub fn session_schemas(&self) -> HashMap<String, DocumentSchema> {
        self.session_schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ingest documents and remember their schemas for this session
    pub async fn ingest(&self, documents: Vec<ResolveRequest>) -> IngestReport {
        let explicit: HashMap<String, DocumentSchema> = documents
            .iter()
            .filter_map(|doc| doc.explicit.clone().map(|s| (doc.document_id.clone(), s)))
            .collect();

        let report = self.ingestor.ingest(documents).await;

        for ingested in &report.succeeded {
            let schema = explicit
                .get(&ingested.document_id)
                .cloned()
                .or_else(|| self.resolver.cache().schema(&ingested.document_id));
            if let Some(schema) = schema {
                self.add_session_schema(schema);
            }
        }
        report
    }

    /// Answer a question under the configured run timeout
    pub async fn answer(&self, question: &str) -> Result<ReasoningState> {
        let ctx = RunContext::with_timeout(self.config.run_timeout());
        self.answer_with(question, &ctx).await
    }

    /// Answer a question under a caller-supplied run context
    pub async fn answer_with(&self, question: &str, ctx: &RunContext) -> Result<ReasoningState> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Generic("question must not be empty".to_string()));
        }

        let state = ReasoningState::new(question)
            .with_max_iterations(self.config.reasoning.max_iterations)
            .with_schemas(self.session_schemas());

        let state = self.executor.run(ctx, state).await?;
        info!(
            steps = state.past_steps.len(),
            iterations = state.iteration,
            answered = state.final_answer.is_some(),
            "question answered"
        );
        Ok(state)
    }
}

fn load_patterns(registry: &PatternRegistry, dir: &Path) {
    match registry.load_dir(dir) {
        Ok(count) => info!(count, dir = %dir.display(), "loaded schema patterns"),
        Err(e) => warn!(dir = %dir.display(), error = %e, "could not load schema patterns"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemoryVectorStore;
    use crate::steps::test_support::EchoGenerator;

    struct UnitEmbedder;

    #[async_trait::async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn engine(reply: &str) -> QueryEngine {
        QueryEngine::new(
            Config::default(),
            EngineParts {
                generator: Arc::new(EchoGenerator::new(reply)),
                embedder: Arc::new(UnitEmbedder),
                store: Arc::new(InMemoryVectorStore::new()),
                registry: Arc::new(PatternRegistry::with_defaults()),
                analyzer: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        assert!(engine("x").answer("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_session_schemas_from_explicit_ingest() {
        let engine = engine("x");
        let report = engine
            .ingest(vec![ResolveRequest::new("doc", "body text", "text")
                .with_explicit(DocumentSchema::new("doc", "text"))])
            .await;
        assert!(report.is_clean());
        assert!(engine.session_schemas().contains_key("doc"));
    }

    #[tokio::test]
    async fn test_constant_generator_run_finishes() {
        let engine = engine("A constant reply.");
        engine
            .ingest(vec![ResolveRequest::new("doc", "A constant reply about things.", "text")
                .with_explicit(DocumentSchema::new("doc", "text"))])
            .await;

        let state = engine.answer("What is in the corpus?").await.unwrap();
        assert_eq!(state.plan().len(), 1);
        assert_eq!(state.past_steps.len(), 1);
        assert_eq!(state.final_answer.as_deref(), Some("A constant reply."));
        assert!(!engine.telemetry().visited_nodes().is_empty());
    }
}

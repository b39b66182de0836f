//! Retrieval step

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::orchestration::pipeline::RETRIEVE;
use crate::orchestration::{Node, NodeOutput, ReasoningState, RunContext};
use crate::retrieval::{RetrieverSet, SearchFilter, StrategyKind};
use crate::schema::SchemaCache;

/// Runs the selected strategy for the current query
pub struct RetrieveNode {
    retrievers: RetrieverSet,
    default: StrategyKind,
    top_k: usize,
    schema_cache: Option<Arc<SchemaCache>>,
}

impl RetrieveNode {
    pub fn new(
        retrievers: RetrieverSet,
        default: StrategyKind,
        top_k: usize,
        schema_cache: Option<Arc<SchemaCache>>,
    ) -> Self {
        Self {
            retrievers,
            default,
            top_k: top_k.max(1),
            schema_cache,
        }
    }
}

#[async_trait]
impl Node for RetrieveNode {
    fn name(&self) -> &str {
        RETRIEVE
    }

    async fn execute(&self, ctx: &RunContext, mut state: ReasoningState) -> Result<NodeOutput> {
        let kind = state.strategy.unwrap_or(self.default);
        let strategy = self
            .retrievers
            .get(kind)
            .or_else(|| self.retrievers.get(self.default))
            .ok_or_else(|| RagError::Retrieval(format!("no retriever registered for {}", kind)))?;

        let query = state
            .current_query
            .clone()
            .or_else(|| state.current_step().map(|step| step.sub_question.clone()))
            .unwrap_or_else(|| state.question.clone());
        let filter = SearchFilter::new().with_schema(state.schema_filter.clone());

        let documents = ctx
            .bounded(strategy.search(&query, self.top_k, &filter))
            .await?;
        debug!(
            strategy = %strategy.kind(),
            documents = documents.len(),
            "retrieval finished"
        );

        if let Some(cache) = &self.schema_cache {
            for document in &documents {
                let document_id = document.document_id();
                if state.schemas.contains_key(document_id) {
                    continue;
                }
                if let Some(schema) = cache.schema(document_id) {
                    state.schemas.insert(document_id.to_string(), schema);
                }
            }
        }

        state.retrieved = documents;
        Ok(NodeOutput::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::PlanStep;
    use crate::providers::{Embedder, InMemoryVectorStore};
    use crate::retrieval::{RankFuser, RetrievedDocument};
    use crate::schema::{DocumentSchema, ResolutionResult, ResolutionStrategy};
    use std::time::Duration;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn retrievers() -> RetrieverSet {
        let store = InMemoryVectorStore::with_documents(vec![
            RetrievedDocument::new("doc-a#0", "tokio runtime internals")
                .with_metadata("document_id", "doc-a")
                .with_embedding(vec![1.0, 0.0]),
            RetrievedDocument::new("doc-b#0", "borrow checker rules")
                .with_metadata("document_id", "doc-b")
                .with_embedding(vec![0.0, 1.0]),
        ]);
        RetrieverSet::standard(Arc::new(UnitEmbedder), Arc::new(store), RankFuser::default())
    }

    #[tokio::test]
    async fn test_runs_selected_strategy() {
        let node = RetrieveNode::new(retrievers(), StrategyKind::Vector, 5, None);
        let mut state = ReasoningState::new("q");
        state.set_plan(vec![PlanStep::new("tokio runtime")]);
        state.current_query = Some("tokio runtime".to_string());
        state.strategy = Some(StrategyKind::Lexical);

        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.retrieved.len(), 1);
        assert_eq!(output.state.retrieved[0].id, "doc-a#0");
    }

    #[tokio::test]
    async fn test_attaches_cached_schemas() {
        let cache = Arc::new(SchemaCache::new(Duration::from_secs(60)));
        cache.insert(
            "doc-a",
            ResolutionResult {
                schema: DocumentSchema::new("doc-a", "text"),
                strategy: ResolutionStrategy::Pattern,
                pattern_name: None,
                confidence: 0.9,
                processing_time_ms: 0,
            },
        );
        let node = RetrieveNode::new(retrievers(), StrategyKind::Vector, 5, Some(cache));
        let mut state = ReasoningState::new("tokio");
        state.current_query = Some("tokio".to_string());

        let output = node.execute(&RunContext::new(), state).await.unwrap();
        assert_eq!(output.state.retrieved.len(), 2);
        assert!(output.state.schemas.contains_key("doc-a"));
        assert!(!output.state.schemas.contains_key("doc-b"));
    }

    #[tokio::test]
    async fn test_empty_retriever_set_is_retrieval_error() {
        let node = RetrieveNode::new(RetrieverSet::new(), StrategyKind::Vector, 5, None);
        let result = node.execute(&RunContext::new(), ReasoningState::new("q")).await;
        assert!(matches!(result, Err(RagError::Retrieval(_))));
    }
}

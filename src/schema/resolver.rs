//! Layered schema resolution
//!
//! Strict priority, first applicable strategy wins:
//! 1. Explicit schema from the caller (confidence 1.0, never cached)
//! 2. Live cache entry for the document id
//! 3. First registered pattern whose indicator match ≥ threshold,
//!    optionally refined by structural analysis
//! 4. Structural analysis (terminal: failure is a resolution error)
//!
//! Steps 2-4 are serialised per document id, so concurrent requests for the
//! same document share one analysis through the cache.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

use crate::errors::Result;
use crate::schema::analyzer::StructureAnalyzer;
use crate::schema::cache::SchemaCache;
use crate::schema::registry::PatternRegistry;
use crate::schema::types::{
    DocumentSchema, ResolutionResult, ResolutionStrategy, SchemaPattern, PROVENANCE_HYBRID,
};

/// Minimum fraction of indicators a pattern must match
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// One document submitted for resolution
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub document_id: String,
    pub content: String,
    pub format: String,
    pub explicit: Option<DocumentSchema>,
}

impl ResolveRequest {
    pub fn new(
        document_id: impl Into<String>,
        content: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            content: content.into(),
            format: format.into(),
            explicit: None,
        }
    }

    pub fn with_explicit(mut self, schema: DocumentSchema) -> Self {
        self.explicit = Some(schema);
        self
    }
}

/// Resolves document schemas through explicit input, cache, patterns and analysis
pub struct SchemaResolver {
    registry: Arc<PatternRegistry>,
    cache: Arc<SchemaCache>,
    analyzer: Arc<dyn StructureAnalyzer>,
    match_threshold: f32,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SchemaResolver {
    pub fn new(
        registry: Arc<PatternRegistry>,
        cache: Arc<SchemaCache>,
        analyzer: Arc<dyn StructureAnalyzer>,
    ) -> Self {
        Self {
            registry,
            cache,
            analyzer,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_match_threshold(mut self, threshold: f32) -> Self {
        self.match_threshold = threshold;
        self
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Resolve the schema of one document
    pub async fn resolve(
        &self,
        document_id: &str,
        content: &str,
        format: &str,
        explicit: Option<DocumentSchema>,
    ) -> Result<ResolutionResult> {
        let started = Instant::now();

        if let Some(schema) = explicit {
            debug!(document = document_id, "using explicit schema");
            return Ok(ResolutionResult {
                schema,
                strategy: ResolutionStrategy::Explicit,
                pattern_name: None,
                confidence: 1.0,
                processing_time_ms: elapsed_ms(started),
            });
        }

        let slot = self.claim(document_id);
        let result = {
            let _guard = slot.lock().await;
            self.resolve_derived(document_id, content, format, started).await
        };
        self.release(document_id, slot);
        result
    }

    async fn resolve_derived(
        &self,
        document_id: &str,
        content: &str,
        format: &str,
        started: Instant,
    ) -> Result<ResolutionResult> {
        if let Some(mut cached) = self.cache.get(document_id) {
            debug!(document = document_id, strategy = %cached.strategy, "schema cache hit");
            cached.processing_time_ms = elapsed_ms(started);
            return Ok(cached);
        }

        if let Some(result) = self.match_patterns(document_id, content, format, started).await {
            self.cache.insert(document_id, result.clone());
            return Ok(result);
        }

        debug!(document = document_id, "no pattern matched, analyzing structure");
        let schema = self.analyzer.analyze(document_id, content, format).await?;
        let result = ResolutionResult {
            confidence: schema.confidence,
            schema,
            strategy: ResolutionStrategy::Llm,
            pattern_name: None,
            processing_time_ms: elapsed_ms(started),
        };
        info!(document = document_id, confidence = result.confidence, "schema derived by analysis");
        self.cache.insert(document_id, result.clone());
        Ok(result)
    }

    /// Per-document lock shared by every in-flight resolution of that id
    fn claim(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry once no other resolution holds or awaits it
    fn release(&self, document_id: &str, slot: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only handed out under this lock: map + `slot` = 2
        if Arc::strong_count(&slot) == 2 {
            in_flight.remove(document_id);
        }
    }

    /// Resolve many documents concurrently; each outcome is independent
    pub async fn resolve_batch(&self, requests: Vec<ResolveRequest>) -> Vec<Result<ResolutionResult>> {
        join_all(requests.into_iter().map(|request| async move {
            self.resolve(
                &request.document_id,
                &request.content,
                &request.format,
                request.explicit,
            )
            .await
        }))
        .await
    }

    async fn match_patterns(
        &self,
        document_id: &str,
        content: &str,
        format: &str,
        started: Instant,
    ) -> Option<ResolutionResult> {
        for pattern in self.registry.ordered() {
            let confidence = pattern.match_confidence(content);
            if confidence < self.match_threshold {
                continue;
            }

            info!(
                document = document_id,
                pattern = %pattern.name,
                confidence,
                "schema pattern matched"
            );
            let schema = pattern.instantiate(document_id, format);
            let result = if pattern.enhance {
                self.enhance(&pattern, schema, confidence, document_id, content, format)
                    .await
            } else {
                (schema, ResolutionStrategy::Pattern, confidence)
            };

            let (mut schema, strategy, confidence) = result;
            schema.confidence = confidence;
            return Some(ResolutionResult {
                schema,
                strategy,
                pattern_name: Some(pattern.name),
                confidence,
                processing_time_ms: elapsed_ms(started),
            });
        }
        None
    }

    /// Refine a pattern schema with analysis; failure keeps the pattern result
    async fn enhance(
        &self,
        pattern: &SchemaPattern,
        schema: DocumentSchema,
        confidence: f32,
        document_id: &str,
        content: &str,
        format: &str,
    ) -> (DocumentSchema, ResolutionStrategy, f32) {
        match self.analyzer.analyze(document_id, content, format).await {
            Ok(analysis) => {
                let merged_confidence = (confidence + analysis.confidence) / 2.0;
                (
                    merge_enhancement(schema, analysis),
                    ResolutionStrategy::Hybrid,
                    merged_confidence,
                )
            }
            Err(e) => {
                debug!(pattern = %pattern.name, error = %e, "enhancement failed, keeping pattern schema");
                (schema, ResolutionStrategy::Pattern, confidence)
            }
        }
    }
}

/// Analysis structure replaces the template's where present; the template
/// keeps its attributes unless analysis overrides a key
fn merge_enhancement(template: DocumentSchema, analysis: DocumentSchema) -> DocumentSchema {
    let mut merged = template;

    if !analysis.sections.is_empty() {
        merged.hierarchy = analysis.hierarchy;
        merged.sections = analysis.sections;
    }
    if !analysis.semantic_regions.is_empty() {
        merged.semantic_regions = analysis.semantic_regions;
    }
    if analysis.title.is_some() {
        merged.title = analysis.title;
    }
    for (key, value) in analysis.custom_attributes {
        merged.custom_attributes.insert(key, value);
    }
    merged.provenance = PROVENANCE_HYBRID.to_string();
    merged
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RagError;
    use crate::schema::types::Section;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingAnalyzer {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    impl CountingAnalyzer {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: None,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Some(delay),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StructureAnalyzer for CountingAnalyzer {
        async fn analyze(
            &self,
            document_id: &str,
            _content: &str,
            format: &str,
        ) -> Result<DocumentSchema> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(RagError::Resolution("analysis unavailable".to_string()));
            }
            let mut schema = DocumentSchema::new(document_id, format)
                .with_sections(vec![Section::new("a1", "Analyzed", 1).with_range(0, 10)]);
            schema.confidence = 0.6;
            schema.title = Some("Analyzed title".to_string());
            Ok(schema)
        }
    }

    fn abc_pattern(enhance: bool) -> SchemaPattern {
        SchemaPattern {
            name: "abc".to_string(),
            description: String::new(),
            indicators: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            priority: 1,
            enhance,
            template: DocumentSchema::default().with_attribute("kind", "abc"),
        }
    }

    fn resolver(registry: PatternRegistry, analyzer: Arc<CountingAnalyzer>) -> SchemaResolver {
        SchemaResolver::new(
            Arc::new(registry),
            Arc::new(SchemaCache::default()),
            analyzer,
        )
    }

    #[tokio::test]
    async fn test_explicit_bypasses_everything() {
        let analyzer = CountingAnalyzer::ok();
        let registry = PatternRegistry::new();
        registry.register(abc_pattern(false)).unwrap();
        let resolver = resolver(registry, analyzer.clone());

        let explicit = DocumentSchema::new("given", "text");
        let result = resolver
            .resolve("doc", "A B C", "text", Some(explicit.clone()))
            .await
            .unwrap();

        assert_eq!(result.strategy, ResolutionStrategy::Explicit);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.schema.document_id, "given");
        assert_eq!(analyzer.calls(), 0);
        assert!(resolver.cache().get("doc").is_none());
    }

    #[tokio::test]
    async fn test_pattern_threshold() {
        let registry = PatternRegistry::new();
        registry.register(abc_pattern(false)).unwrap();
        let analyzer = CountingAnalyzer::ok();
        let resolver = resolver(registry, analyzer.clone());

        let matched = resolver.resolve("two", "A and B", "text", None).await.unwrap();
        assert_eq!(matched.strategy, ResolutionStrategy::Pattern);
        assert_eq!(matched.pattern_name.as_deref(), Some("abc"));
        assert!((matched.confidence - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(matched.schema.document_id, "two");
        assert_eq!(analyzer.calls(), 0);

        let fallback = resolver.resolve("one", "only A", "text", None).await.unwrap();
        assert_eq!(fallback.strategy, ResolutionStrategy::Llm);
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_analysis() {
        let analyzer = CountingAnalyzer::ok();
        let resolver = resolver(PatternRegistry::new(), analyzer.clone());

        let first = resolver.resolve("doc", "text", "text", None).await.unwrap();
        let second = resolver.resolve("doc", "text", "text", None).await.unwrap();

        assert_eq!(first.schema, second.schema);
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_enhancement_success_is_hybrid() {
        let registry = PatternRegistry::new();
        registry.register(abc_pattern(true)).unwrap();
        let analyzer = CountingAnalyzer::ok();
        let resolver = resolver(registry, analyzer.clone());

        let result = resolver.resolve("doc", "A B C", "text", None).await.unwrap();
        assert_eq!(result.strategy, ResolutionStrategy::Hybrid);
        assert_eq!(result.schema.sections[0].id, "a1");
        assert_eq!(result.schema.custom_attributes["kind"], "abc");
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_enhancement_failure_keeps_pattern() {
        let registry = PatternRegistry::new();
        registry.register(abc_pattern(true)).unwrap();
        let resolver = resolver(registry, CountingAnalyzer::failing());

        let result = resolver.resolve("doc", "A B C", "text", None).await.unwrap();
        assert_eq!(result.strategy, ResolutionStrategy::Pattern);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_terminal() {
        let resolver = resolver(PatternRegistry::new(), CountingAnalyzer::failing());
        let err = resolver.resolve("doc", "text", "text", None).await.unwrap_err();
        assert!(matches!(err, RagError::Resolution(_)));
        assert!(resolver.cache().get("doc").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_analyze_once() {
        let analyzer = CountingAnalyzer::slow(Duration::from_millis(20));
        let resolver = resolver(PatternRegistry::new(), analyzer.clone());

        let results = resolver
            .resolve_batch(vec![
                ResolveRequest::new("doc", "text", "text"),
                ResolveRequest::new("doc", "text", "text"),
                ResolveRequest::new("other", "text", "text"),
            ])
            .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(
            results[0].as_ref().unwrap().schema,
            results[1].as_ref().unwrap().schema
        );
        assert_eq!(analyzer.calls(), 2);
        assert!(resolver.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_schema_is_returned_verbatim() {
        let resolver = resolver(PatternRegistry::new(), CountingAnalyzer::ok());
        let explicit = DocumentSchema::new("doc", "text");

        let result = resolver
            .resolve("doc", "text", "text", Some(explicit.clone()))
            .await
            .unwrap();
        assert_eq!(result.schema, explicit);
        assert!(result.schema.provenance.is_empty());
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let resolver = resolver(PatternRegistry::new(), CountingAnalyzer::failing());
        let results = resolver
            .resolve_batch(vec![
                ResolveRequest::new("bad", "text", "text"),
                ResolveRequest::new("good", "text", "text")
                    .with_explicit(DocumentSchema::new("good", "text")),
            ])
            .await;
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}

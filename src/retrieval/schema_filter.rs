//! Schema-filtered retrieval
//!
//! Vector search narrowed by predicates derived from resolved document
//! schemas: document allowlist, section types, semantic tags, a score
//! floor and custom attribute equalities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::errors::Result;
use crate::retrieval::types::{
    FilterCondition, MetadataFilter, RetrievedDocument, META_SECTION_TYPE, META_SEMANTIC_TAGS,
};
use crate::retrieval::vector::VectorRetriever;
use crate::retrieval::{RetrievalStrategy, SearchFilter, StrategyKind};
use crate::schema::DocumentSchema;

/// Schema-derived search predicates; empty fields impose no constraint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaFilter {
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub section_types: Vec<String>,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub custom_attributes: Map<String, Value>,
}

impl SchemaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
            && self.section_types.is_empty()
            && self.semantic_tags.is_empty()
            && self.min_score.is_none()
            && self.custom_attributes.is_empty()
    }

    /// Metadata predicates equivalent to this filter (score floor excluded)
    pub fn to_metadata_filter(&self) -> MetadataFilter {
        let mut filter = MetadataFilter::new();

        if !self.document_ids.is_empty() {
            filter = filter.with(FilterCondition::IdIn {
                ids: self.document_ids.clone(),
            });
        }
        if !self.section_types.is_empty() {
            filter = filter.with(FilterCondition::AnyOf {
                key: META_SECTION_TYPE.to_string(),
                values: self.section_types.iter().cloned().map(Value::from).collect(),
            });
        }
        if !self.semantic_tags.is_empty() {
            filter = filter.with(FilterCondition::AnyOf {
                key: META_SEMANTIC_TAGS.to_string(),
                values: self.semantic_tags.iter().cloned().map(Value::from).collect(),
            });
        }
        for (key, value) in &self.custom_attributes {
            filter = filter.equals(key.clone(), value.clone());
        }

        filter
    }

    /// Build a filter from a plan step's schema hint
    ///
    /// Hint terms are matched case-insensitively against section types,
    /// titles and keywords, and against region types and keywords. Returns
    /// `None` when nothing in the session's schemas matches.
    pub fn from_hint(schemas: &HashMap<String, DocumentSchema>, hint: &str) -> Option<Self> {
        let terms: Vec<String> = hint
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .map(|term| term.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
            .filter(|term| term.len() >= 3)
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return None;
        }
        let mentions = |text: &str| -> bool {
            let text = text.to_lowercase();
            terms.iter().any(|term| text.contains(term.as_str()))
        };

        let mut filter = SchemaFilter::new();

        // Sorted for a deterministic filter regardless of map order
        let mut ids: Vec<&String> = schemas.keys().collect();
        ids.sort();

        for id in ids {
            let schema = &schemas[id];
            let mut matched = false;

            for section in &schema.sections {
                let hit = section.section_type.as_deref().is_some_and(mentions)
                    || mentions(section.title.as_str())
                    || section.keywords.iter().any(|k| mentions(k.as_str()));
                if !hit {
                    continue;
                }
                matched = true;
                if let Some(section_type) = &section.section_type {
                    push_unique(&mut filter.section_types, section_type);
                }
            }

            for region in &schema.semantic_regions {
                let hit = mentions(region.region_type.as_str())
                    || region.keywords.iter().any(|k| mentions(k.as_str()));
                if hit && !region.region_type.is_empty() {
                    matched = true;
                    push_unique(&mut filter.semantic_tags, &region.region_type);
                }
            }

            if matched {
                push_unique(&mut filter.document_ids, &schema.document_id);
            }
        }

        (!filter.is_empty()).then_some(filter)
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Vector search with schema-derived predicates merged into the filter
#[derive(Clone)]
pub struct SchemaFilteredRetriever {
    vector: VectorRetriever,
}

impl SchemaFilteredRetriever {
    pub fn new(vector: VectorRetriever) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl RetrievalStrategy for SchemaFilteredRetriever {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Schema
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RetrievedDocument>> {
        let Some(schema) = &filter.schema else {
            debug!("no schema filter, plain vector search");
            return self
                .vector
                .search_filtered(query, top_k, filter.metadata.clone(), None)
                .await;
        };

        let metadata = filter.metadata.merged(&schema.to_metadata_filter());
        debug!(conditions = metadata.must.len(), "schema-filtered search");
        self.vector
            .search_filtered(query, top_k, metadata, schema.min_score)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Embedder, InMemoryVectorStore};
    use crate::retrieval::types::META_DOCUMENT_ID;
    use crate::schema::{Section, SemanticRegion};
    use serde_json::json;
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

    fn retriever() -> SchemaFilteredRetriever {
        let store = Arc::new(InMemoryVectorStore::with_documents(vec![
            RetrievedDocument::new("paper#0", "methods text")
                .with_embedding(vec![1.0, 0.0])
                .with_metadata(META_DOCUMENT_ID, "paper")
                .with_metadata(META_SECTION_TYPE, "methods")
                .with_metadata(META_SEMANTIC_TAGS, json!(["procedure"])),
            RetrievedDocument::new("paper#1", "results text")
                .with_embedding(vec![0.6, 0.8])
                .with_metadata(META_DOCUMENT_ID, "paper")
                .with_metadata(META_SECTION_TYPE, "results")
                .with_metadata("venue", "icml"),
            RetrievedDocument::new("manual#0", "install steps")
                .with_embedding(vec![0.9, 0.1])
                .with_metadata(META_DOCUMENT_ID, "manual")
                .with_metadata(META_SECTION_TYPE, "methods"),
        ]));
        SchemaFilteredRetriever::new(VectorRetriever::new(Arc::new(ConstEmbedder), store))
    }

    #[tokio::test]
    async fn test_absent_schema_filter_is_plain_vector_search() {
        let results = retriever()
            .search("q", 10, &SearchFilter::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_document_and_section_allowlists() {
        let schema = SchemaFilter {
            document_ids: vec!["paper".to_string()],
            section_types: vec!["methods".to_string()],
            ..Default::default()
        };
        let results = retriever()
            .search("q", 10, &SearchFilter::new().with_schema(Some(schema)))
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["paper#0"]);
    }

    #[tokio::test]
    async fn test_tags_attributes_and_min_score() {
        let by_tag = SchemaFilter {
            semantic_tags: vec!["procedure".to_string()],
            ..Default::default()
        };
        let results = retriever()
            .search("q", 10, &SearchFilter::new().with_schema(Some(by_tag)))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let mut by_attr = SchemaFilter::new();
        by_attr.custom_attributes.insert("venue".to_string(), json!("icml"));
        let results = retriever()
            .search("q", 10, &SearchFilter::new().with_schema(Some(by_attr)))
            .await
            .unwrap();
        assert_eq!(results[0].id, "paper#1");

        let floor = SchemaFilter {
            min_score: Some(0.95),
            ..Default::default()
        };
        let results = retriever()
            .search("q", 10, &SearchFilter::new().with_schema(Some(floor)))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|d| d.score >= 0.95));
    }

    #[test]
    fn test_from_hint() {
        let mut paper = DocumentSchema::new("paper", "markdown").with_sections(vec![
            Section::new("s1", "Experimental Setup", 1).with_type("methods"),
            Section::new("s2", "Findings", 1).with_type("results"),
        ]);
        paper.semantic_regions.push(SemanticRegion {
            id: "r1".to_string(),
            region_type: "procedure".to_string(),
            keywords: vec!["setup".to_string()],
            ..Default::default()
        });
        let mut schemas = HashMap::new();
        schemas.insert("paper".to_string(), paper);

        let filter = SchemaFilter::from_hint(&schemas, "experimental setup").unwrap();
        assert_eq!(filter.document_ids, vec!["paper"]);
        assert_eq!(filter.section_types, vec!["methods"]);
        assert_eq!(filter.semantic_tags, vec!["procedure"]);

        assert!(SchemaFilter::from_hint(&schemas, "glossary").is_none());
        assert!(SchemaFilter::from_hint(&HashMap::new(), "methods").is_none());
    }
}

//! Retrieval data types: documents and metadata filters

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the source document identifier of a chunk
pub const META_DOCUMENT_ID: &str = "document_id";
/// Metadata key holding the section identifier a chunk came from
pub const META_SECTION_ID: &str = "section_id";
/// Metadata key holding the section title a chunk came from
pub const META_SECTION_TITLE: &str = "section_title";
/// Metadata key holding the semantic type of the section
pub const META_SECTION_TYPE: &str = "section_type";
/// Metadata key holding the semantic region tags overlapping a chunk
pub const META_SEMANTIC_TAGS: &str = "semantic_tags";
/// Metadata key holding the `A > B > C` hierarchy path of a chunk
pub const META_HIERARCHY_PATH: &str = "hierarchy_path";

/// Retrieved document with metadata
///
/// `score` is strategy-specific: similarity for vector search, BM25 weight
/// for lexical search, fused rank score for hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievedDocument {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding: None,
            score: 0.0,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Source document identifier, falling back to the chunk id
    pub fn document_id(&self) -> &str {
        self.metadata
            .get(META_DOCUMENT_ID)
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }
}

/// A single metadata predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterCondition {
    /// Metadata value equals `value`
    Equals { key: String, value: Value },
    /// Metadata value is one of `values`; array metadata matches when it
    /// shares at least one element with `values`
    AnyOf { key: String, values: Vec<Value> },
    /// Document (or its source document) identifier is in the list
    IdIn { ids: Vec<String> },
}

impl FilterCondition {
    pub fn matches(&self, doc: &RetrievedDocument) -> bool {
        match self {
            FilterCondition::Equals { key, value } => doc.metadata.get(key) == Some(value),
            FilterCondition::AnyOf { key, values } => match doc.metadata.get(key) {
                Some(Value::Array(items)) => items.iter().any(|item| values.contains(item)),
                Some(item) => values.contains(item),
                None => false,
            },
            FilterCondition::IdIn { ids } => ids
                .iter()
                .any(|id| id == &doc.id || id == doc.document_id()),
        }
    }
}

/// Conjunction of metadata predicates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub must: Vec<FilterCondition>,
}

impl MetadataFilter {
    /// Filter that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: FilterCondition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn equals(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(FilterCondition::Equals {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// All conditions must hold
    pub fn matches(&self, doc: &RetrievedDocument) -> bool {
        self.must.iter().all(|condition| condition.matches(doc))
    }

    /// Conjunction of both filters
    pub fn merged(&self, other: &MetadataFilter) -> MetadataFilter {
        let mut must = self.must.clone();
        must.extend(other.must.iter().cloned());
        MetadataFilter { must }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk() -> RetrievedDocument {
        RetrievedDocument::new("doc-1#0", "content")
            .with_metadata(META_DOCUMENT_ID, "doc-1")
            .with_metadata(META_SECTION_TYPE, "methods")
            .with_metadata(META_SEMANTIC_TAGS, json!(["definition", "example"]))
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(MetadataFilter::new().matches(&chunk()));
    }

    #[test]
    fn test_equals_condition() {
        assert!(MetadataFilter::new().equals(META_SECTION_TYPE, "methods").matches(&chunk()));
        assert!(!MetadataFilter::new().equals(META_SECTION_TYPE, "results").matches(&chunk()));
    }

    #[test]
    fn test_any_of_on_array_metadata() {
        let filter = MetadataFilter::new().with(FilterCondition::AnyOf {
            key: META_SEMANTIC_TAGS.to_string(),
            values: vec![json!("example"), json!("warning")],
        });
        assert!(filter.matches(&chunk()));

        let filter = MetadataFilter::new().with(FilterCondition::AnyOf {
            key: META_SEMANTIC_TAGS.to_string(),
            values: vec![json!("warning")],
        });
        assert!(!filter.matches(&chunk()));
    }

    #[test]
    fn test_id_in_matches_source_document() {
        let filter = MetadataFilter::new().with(FilterCondition::IdIn {
            ids: vec!["doc-1".to_string()],
        });
        assert!(filter.matches(&chunk()));
        assert_eq!(chunk().document_id(), "doc-1");
    }
}

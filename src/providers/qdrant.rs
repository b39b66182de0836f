//! Qdrant-backed vector store
//!
//! Chunks are stored as points whose UUID is derived from the chunk id;
//! the original id and content travel in the payload so search results
//! round-trip to `RetrievedDocument`s unchanged.

use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        condition::ConditionOneOf, r#match::MatchValue, vectors_config::Config,
        with_payload_selector::SelectorOptions, Condition, CreateCollection, Distance,
        FieldCondition, Filter, Match, PointStruct, PointsIdsList, PointsSelector,
        value::Kind, ListValue, RepeatedIntegers, RepeatedStrings, ScrollPoints, SearchPoints,
        Value as QdrantValue, VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{RagError, Result};
use crate::providers::{SearchRequest, VectorStore};
use crate::retrieval::types::{FilterCondition, MetadataFilter, RetrievedDocument, META_DOCUMENT_ID};

/// Payload key holding the chunk text
const PAYLOAD_CONTENT: &str = "content";
/// Payload key holding the original chunk id
const PAYLOAD_CHUNK_ID: &str = "chunk_id";

/// Vector store backed by a Qdrant collection
pub struct QdrantStore {
    client: QdrantClient,
    collection: String,
    dimension: u64,
}

fn store_err(context: &str, err: impl std::fmt::Display) -> RagError {
    RagError::VectorStore(format!("{}: {}", context, err))
}

impl QdrantStore {
    /// Connect to Qdrant and make sure the collection exists
    pub async fn connect(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| store_err("failed to create Qdrant client", e))?;

        let store = Self {
            client,
            collection: collection.to_string(),
            dimension: dimension as u64,
        };
        store.ensure_collection().await?;

        Ok(store)
    }

    /// Create the collection with cosine distance if missing
    pub async fn ensure_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| store_err("failed to list collections", e))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            info!(collection = %self.collection, dimension = self.dimension, "creating collection");
            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: self.dimension,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(|e| store_err("failed to create collection", e))?;
        }

        Ok(())
    }

    fn payload_selector() -> Option<WithPayloadSelector> {
        Some(WithPayloadSelector {
            selector_options: Some(SelectorOptions::Enable(true)),
        })
    }
}

/// Deterministic point id for a chunk id
pub fn point_uuid(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedDocument>> {
        let filter = to_qdrant_filter(&request.filter)?;

        match &request.vector {
            Some(vector) => {
                let response = self
                    .client
                    .search_points(&SearchPoints {
                        collection_name: self.collection.clone(),
                        vector: vector.clone(),
                        limit: request.limit as u64,
                        with_payload: Self::payload_selector(),
                        score_threshold: request.min_score,
                        filter,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| store_err("failed to search points", e))?;

                Ok(response
                    .result
                    .into_iter()
                    .map(|point| payload_to_document(point.payload, point.score))
                    .collect())
            }
            None => {
                let response = self
                    .client
                    .scroll(&ScrollPoints {
                        collection_name: self.collection.clone(),
                        filter,
                        limit: Some(request.limit as u32),
                        with_payload: Self::payload_selector(),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| store_err("failed to scroll points", e))?;

                Ok(response
                    .result
                    .into_iter()
                    .map(|point| payload_to_document(point.payload, 0.0))
                    .collect())
            }
        }
    }

    async fn upsert(&self, documents: Vec<RetrievedDocument>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(documents.len());
        for doc in documents {
            let embedding = doc.embedding.ok_or_else(|| {
                RagError::VectorStore(format!("document '{}' has no embedding", doc.id))
            })?;

            let mut payload: HashMap<String, QdrantValue> = doc
                .metadata
                .into_iter()
                .map(|(key, value)| (key, json_to_qdrant_value(value)))
                .collect();
            payload.insert(PAYLOAD_CONTENT.to_string(), QdrantValue::from(doc.content));
            payload.insert(PAYLOAD_CHUNK_ID.to_string(), QdrantValue::from(doc.id.clone()));

            points.push(PointStruct::new(point_uuid(&doc.id), embedding, payload));
        }

        debug!(collection = %self.collection, points = points.len(), "upserting points");
        self.client
            .upsert_points_blocking(self.collection.clone(), None, points, None)
            .await
            .map_err(|e| store_err("failed to upsert points", e))?;

        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids = ids
            .iter()
            .map(|id| qdrant_client::qdrant::PointId::from(point_uuid(id)))
            .collect();

        self.client
            .delete_points(
                self.collection.clone(),
                None,
                &PointsSelector {
                    points_selector_one_of: Some(
                        qdrant_client::qdrant::points_selector::PointsSelectorOneOf::Points(
                            PointsIdsList { ids: point_ids },
                        ),
                    ),
                },
                None,
            )
            .await
            .map_err(|e| store_err("failed to delete points", e))?;

        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(self.collection.clone())
            .await
            .map_err(|e| store_err("failed to get collection info", e))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }
}

// Filter translation

fn field_condition(key: &str, match_value: MatchValue) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(match_value),
            }),
            ..Default::default()
        })),
    }
}

fn scalar_match(key: &str, value: &JsonValue) -> Result<MatchValue> {
    match value {
        JsonValue::String(s) => Ok(MatchValue::Keyword(s.clone())),
        JsonValue::Bool(b) => Ok(MatchValue::Boolean(*b)),
        JsonValue::Number(n) => n.as_i64().map(MatchValue::Integer).ok_or_else(|| {
            RagError::VectorStore(format!("non-integer match on '{}' is not supported", key))
        }),
        other => Err(RagError::VectorStore(format!(
            "unsupported match value on '{}': {}",
            key, other
        ))),
    }
}

fn set_match(key: &str, values: &[JsonValue]) -> Result<MatchValue> {
    if values.iter().all(JsonValue::is_string) {
        return Ok(MatchValue::Keywords(RepeatedStrings {
            strings: values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        }));
    }
    if values.iter().all(|v| v.as_i64().is_some()) {
        return Ok(MatchValue::Integers(RepeatedIntegers {
            integers: values.iter().filter_map(JsonValue::as_i64).collect(),
        }));
    }
    Err(RagError::VectorStore(format!(
        "mixed or unsupported value set on '{}'",
        key
    )))
}

fn to_qdrant_filter(filter: &MetadataFilter) -> Result<Option<Filter>> {
    if filter.is_empty() {
        return Ok(None);
    }

    let mut must = Vec::with_capacity(filter.must.len());
    for condition in &filter.must {
        let translated = match condition {
            FilterCondition::Equals { key, value } => field_condition(key, scalar_match(key, value)?),
            FilterCondition::AnyOf { key, values } => field_condition(key, set_match(key, values)?),
            FilterCondition::IdIn { ids } => {
                let keywords = MatchValue::Keywords(RepeatedStrings {
                    strings: ids.clone(),
                });
                Condition {
                    condition_one_of: Some(ConditionOneOf::Filter(Filter {
                        should: vec![
                            field_condition(META_DOCUMENT_ID, keywords.clone()),
                            field_condition(PAYLOAD_CHUNK_ID, keywords),
                        ],
                        ..Default::default()
                    })),
                }
            }
        };
        must.push(translated);
    }

    Ok(Some(Filter {
        must,
        ..Default::default()
    }))
}

// Payload conversions

fn payload_to_document(payload: HashMap<String, QdrantValue>, score: f32) -> RetrievedDocument {
    let mut metadata = Map::new();
    let mut content = String::new();
    let mut chunk_id = String::new();

    for (key, value) in payload {
        match key.as_str() {
            PAYLOAD_CONTENT => content = qdrant_value_to_string(&value).unwrap_or_default(),
            PAYLOAD_CHUNK_ID => chunk_id = qdrant_value_to_string(&value).unwrap_or_default(),
            _ => {
                if let Some(json) = qdrant_to_json_value(&value) {
                    metadata.insert(key, json);
                }
            }
        }
    }

    RetrievedDocument {
        id: chunk_id,
        content,
        embedding: None,
        score,
        metadata,
    }
}

fn json_to_qdrant_value(json: JsonValue) -> QdrantValue {
    match json {
        JsonValue::String(s) => QdrantValue::from(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                QdrantValue::from(i)
            } else if let Some(f) = n.as_f64() {
                QdrantValue::from(f)
            } else {
                QdrantValue::from(0)
            }
        }
        JsonValue::Bool(b) => QdrantValue::from(b),
        JsonValue::Array(items) => QdrantValue {
            kind: Some(Kind::ListValue(ListValue {
                values: items.into_iter().map(json_to_qdrant_value).collect(),
            })),
        },
        _ => QdrantValue::from(""),
    }
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().and_then(|kind| {
        match kind {
            Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
            Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
            Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
            Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
            Kind::ListValue(list) => Some(JsonValue::Array(
                list.values.iter().filter_map(qdrant_to_json_value).collect(),
            )),
            _ => None,
        }
    })
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| {
        match kind {
            Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_uuid_is_deterministic() {
        assert_eq!(point_uuid("doc-1#0"), point_uuid("doc-1#0"));
        assert_ne!(point_uuid("doc-1#0"), point_uuid("doc-1#1"));
        assert!(Uuid::parse_str(&point_uuid("x")).is_ok());
    }

    #[test]
    fn test_empty_filter_translates_to_none() {
        assert!(to_qdrant_filter(&MetadataFilter::new()).unwrap().is_none());
    }

    #[test]
    fn test_filter_translation() {
        let filter = MetadataFilter::new()
            .equals("section_type", "methods")
            .with(FilterCondition::AnyOf {
                key: "semantic_tags".to_string(),
                values: vec![json!("definition")],
            })
            .with(FilterCondition::IdIn {
                ids: vec!["doc-1".to_string()],
            });
        let translated = to_qdrant_filter(&filter).unwrap().unwrap();
        assert_eq!(translated.must.len(), 3);
    }

    #[test]
    fn test_float_equality_rejected() {
        let filter = MetadataFilter::new().equals("score", 0.5);
        assert!(to_qdrant_filter(&filter).is_err());
    }

    #[test]
    fn test_payload_round_trip() {
        let mut payload = HashMap::new();
        payload.insert(PAYLOAD_CONTENT.to_string(), QdrantValue::from("text".to_string()));
        payload.insert(PAYLOAD_CHUNK_ID.to_string(), QdrantValue::from("c1".to_string()));
        payload.insert("section_type".to_string(), json_to_qdrant_value(json!("intro")));

        let doc = payload_to_document(payload, 0.9);
        assert_eq!(doc.id, "c1");
        assert_eq!(doc.content, "text");
        assert_eq!(doc.metadata["section_type"], json!("intro"));
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Qdrant
    async fn test_upsert_and_search_live() {
        let store = QdrantStore::connect("http://localhost:6334", "multihop_test", 4)
            .await
            .unwrap();
        let doc = RetrievedDocument::new("t1", "hello").with_embedding(vec![0.1, 0.2, 0.3, 0.4]);
        store.upsert(vec![doc]).await.unwrap();

        let results = store
            .search(&SearchRequest::similar_to(vec![0.1, 0.2, 0.3, 0.4], 1))
            .await
            .unwrap();
        assert_eq!(results[0].id, "t1");
    }
}

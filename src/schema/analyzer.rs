//! Structural analysis collaborator
//!
//! Derives a document schema from raw content. The LLM-backed analyzer
//! sends a bounded prompt and decodes the first balanced JSON object of the
//! response; any failure is a terminal resolution error.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::parsing::{lenient_strings, lenient_text, parse_embedded_json};
use crate::providers::TextGenerator;
use crate::schema::types::{
    DocumentSchema, HierarchyTree, OffsetRange, Section, SemanticRegion,
    DEFAULT_CHUNKING_STRATEGY, PROVENANCE_LLM,
};
use crate::types::{ChatMessage, GenerationParams};

/// Default content budget of an analysis prompt, in characters
pub const DEFAULT_MAX_ANALYSIS_CHARS: usize = 8000;

/// Produces a schema from document content
#[async_trait]
pub trait StructureAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        document_id: &str,
        content: &str,
        format: &str,
    ) -> Result<DocumentSchema>;
}

const SYSTEM_PROMPT: &str = "You analyze document structure. Reply with a single JSON object and nothing else.";

/// Analyzer backed by a text generator
pub struct LlmStructureAnalyzer {
    generator: Arc<dyn TextGenerator>,
    max_chars: usize,
    params: GenerationParams,
}

impl LlmStructureAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            max_chars: DEFAULT_MAX_ANALYSIS_CHARS,
            params: GenerationParams {
                max_tokens: Some(2048),
                ..GenerationParams::structured()
            },
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn build_prompt(&self, content: &str, format: &str) -> String {
        let excerpt = truncate_chars(content, self.max_chars);
        let truncated = if excerpt.len() < content.len() {
            "\n[content truncated]"
        } else {
            ""
        };

        format!(
            r#"Analyze the structure of this {format} document.

Return JSON with these fields:
{{
  "title": "document title or null",
  "sections": [{{"id": "s1", "title": "...", "level": 1, "start": 0, "end": 120,
                "type": "introduction", "summary": "...", "keywords": ["..."],
                "parent": null, "children": []}}],
  "semantic_regions": [{{"id": "r1", "type": "definition", "description": "...",
                        "keywords": ["..."], "boundaries": [{{"start": 0, "end": 50}}],
                        "confidence": 0.8}}],
  "custom_attributes": {{}},
  "chunking_strategy": "section | hierarchical | fixed",
  "confidence": 0.0
}}

Offsets are character positions in the document.

DOCUMENT:
{excerpt}{truncated}"#
        )
    }
}

#[async_trait]
impl StructureAnalyzer for LlmStructureAnalyzer {
    async fn analyze(
        &self,
        document_id: &str,
        content: &str,
        format: &str,
    ) -> Result<DocumentSchema> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(self.build_prompt(content, format)),
        ];

        let generation = self
            .generator
            .generate(&messages, &self.params)
            .await
            .map_err(|e| RagError::Resolution(format!("structure analysis failed: {}", e)))?;

        let analysis: Analysis = parse_embedded_json(&generation.text)
            .map_err(|e| RagError::Resolution(format!("unparsable structure analysis: {}", e)))?;

        debug!(
            document = document_id,
            sections = analysis.sections.len(),
            regions = analysis.semantic_regions.len(),
            "structure analysis decoded"
        );
        Ok(analysis.into_schema(document_id, format))
    }
}

/// First `max_chars` characters of `text`, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[derive(Debug, Deserialize)]
struct Analysis {
    #[serde(default, deserialize_with = "lenient_text")]
    title: Option<String>,
    #[serde(default)]
    sections: Vec<AnalyzedSection>,
    #[serde(default)]
    semantic_regions: Vec<AnalyzedRegion>,
    #[serde(default)]
    custom_attributes: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient_text")]
    chunking_strategy: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedSection {
    #[serde(default, deserialize_with = "lenient_text")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    title: Option<String>,
    #[serde(default)]
    level: Option<u32>,
    #[serde(default, alias = "start_offset")]
    start: Option<usize>,
    #[serde(default, alias = "end_offset")]
    end: Option<usize>,
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    section_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    keywords: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    parent: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedRegion {
    #[serde(default, deserialize_with = "lenient_text")]
    id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    region_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    keywords: Vec<String>,
    #[serde(default)]
    boundaries: Vec<OffsetRange>,
    #[serde(default)]
    confidence: Option<f32>,
}

impl Analysis {
    fn into_schema(self, document_id: &str, format: &str) -> DocumentSchema {
        let sections: Vec<Section> = self
            .sections
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let start = raw.start.unwrap_or(0);
                Section {
                    id: raw.id.unwrap_or_else(|| format!("section_{}", index + 1)),
                    title: raw.title.unwrap_or_default(),
                    level: raw.level.unwrap_or(1).max(1),
                    range: OffsetRange::new(start, raw.end.unwrap_or(start).max(start)),
                    section_type: raw.section_type,
                    summary: raw.summary,
                    keywords: raw.keywords,
                    parent: raw.parent,
                    children: raw.children,
                }
            })
            .collect();

        let semantic_regions = self
            .semantic_regions
            .into_iter()
            .enumerate()
            .map(|(index, raw)| SemanticRegion {
                id: raw.id.unwrap_or_else(|| format!("region_{}", index + 1)),
                region_type: raw.region_type.unwrap_or_default(),
                description: raw.description,
                keywords: raw.keywords,
                boundaries: raw.boundaries,
                confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            })
            .collect();

        DocumentSchema {
            document_id: document_id.to_string(),
            format: format.to_string(),
            title: self.title,
            hierarchy: HierarchyTree::from_sections(&sections),
            sections,
            semantic_regions,
            custom_attributes: self.custom_attributes.unwrap_or_default(),
            chunking_strategy: self
                .chunking_strategy
                .unwrap_or_else(|| DEFAULT_CHUNKING_STRATEGY.to_string()),
            confidence: self.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            provenance: PROVENANCE_LLM.to_string(),
            created_at: Utc::now(),
        }
    }
}

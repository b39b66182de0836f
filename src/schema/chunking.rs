//! Schema-guided chunking
//!
//! Strategies:
//! - `section`: one chunk per top-level section
//! - `hierarchical`: one chunk per leaf section, tagged with its full path
//! - `fixed`: overlapping character windows
//!
//! Sections longer than the window are split further. A schema without
//! usable section ranges falls back to fixed windows. Offsets are in
//! characters.

use serde_json::Value;

use crate::retrieval::types::{
    RetrievedDocument, META_DOCUMENT_ID, META_HIERARCHY_PATH, META_SECTION_ID,
    META_SECTION_TITLE, META_SECTION_TYPE, META_SEMANTIC_TAGS,
};
use crate::schema::types::{DocumentSchema, OffsetRange, Section};

/// Default window size, in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default window overlap, in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for SchemaChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl SchemaChunker {
    /// Overlap is clamped below the chunk size
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Split `content` into chunks carrying schema metadata overlays
    pub fn chunk(&self, content: &str, schema: &DocumentSchema) -> Vec<RetrievedDocument> {
        let text = CharText::new(content);

        let spans: Vec<(OffsetRange, Option<&Section>)> =
            match schema.chunking_strategy.as_str() {
                "fixed" => self.whole_document(&text),
                "hierarchical" => self.section_spans(&text, leaf_sections(schema)),
                _ => self.section_spans(&text, top_level_sections(schema)),
            };
        let spans = if spans.is_empty() {
            self.whole_document(&text)
        } else {
            spans
        };

        spans
            .into_iter()
            .filter_map(|(range, section)| {
                let body = text.slice(range);
                (!body.trim().is_empty()).then(|| (range, section, body.to_string()))
            })
            .enumerate()
            .map(|(index, (range, section, body))| {
                annotate(
                    RetrievedDocument::new(format!("{}#{}", schema.document_id, index), body),
                    schema,
                    section,
                    range,
                )
            })
            .collect()
    }

    fn whole_document<'a>(&self, text: &CharText) -> Vec<(OffsetRange, Option<&'a Section>)> {
        self.windows(OffsetRange::new(0, text.len()))
            .into_iter()
            .map(|range| (range, None))
            .collect()
    }

    fn section_spans<'a>(
        &self,
        text: &CharText,
        sections: Vec<&'a Section>,
    ) -> Vec<(OffsetRange, Option<&'a Section>)> {
        sections
            .into_iter()
            .filter_map(|section| {
                let start = section.range.start.min(text.len());
                let end = section.range.end.min(text.len());
                (start < end).then(|| (OffsetRange::new(start, end), section))
            })
            .flat_map(|(range, section)| {
                self.windows(range)
                    .into_iter()
                    .map(move |window| (window, Some(section)))
            })
            .collect()
    }

    /// Overlapping windows covering `range`
    fn windows(&self, range: OffsetRange) -> Vec<OffsetRange> {
        if range.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut windows = Vec::new();
        let mut start = range.start;
        loop {
            let end = (start + self.chunk_size).min(range.end);
            windows.push(OffsetRange::new(start, end));
            if end >= range.end {
                break;
            }
            start += step;
        }
        windows
    }
}

fn top_level_sections(schema: &DocumentSchema) -> Vec<&Section> {
    let Some(top) = schema.sections.iter().map(|s| s.level).min() else {
        return Vec::new();
    };
    schema.sections.iter().filter(|s| s.level == top).collect()
}

fn leaf_sections(schema: &DocumentSchema) -> Vec<&Section> {
    schema
        .sections
        .iter()
        .filter(|section| {
            section.children.is_empty()
                && !schema
                    .sections
                    .iter()
                    .any(|other| other.parent.as_deref() == Some(section.id.as_str()))
        })
        .collect()
}

fn annotate(
    mut chunk: RetrievedDocument,
    schema: &DocumentSchema,
    section: Option<&Section>,
    range: OffsetRange,
) -> RetrievedDocument {
    for (key, value) in &schema.custom_attributes {
        chunk.metadata.insert(key.clone(), value.clone());
    }
    chunk = chunk.with_metadata(META_DOCUMENT_ID, schema.document_id.as_str());

    if let Some(section) = section {
        chunk = chunk
            .with_metadata(META_SECTION_ID, section.id.as_str())
            .with_metadata(META_SECTION_TITLE, section.title.as_str())
            .with_metadata(
                META_HIERARCHY_PATH,
                schema.section_path(&section.id).join(" > "),
            );
        if let Some(section_type) = &section.section_type {
            chunk = chunk.with_metadata(META_SECTION_TYPE, section_type.as_str());
        }
    }

    let mut tags: Vec<Value> = Vec::new();
    for region in &schema.semantic_regions {
        let tag = Value::from(region.region_type.as_str());
        if !region.region_type.is_empty() && region.overlaps(&range) && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    if !tags.is_empty() {
        chunk = chunk.with_metadata(META_SEMANTIC_TAGS, Value::Array(tags));
    }

    chunk
}

/// Character-indexed view of a string
struct CharText<'a> {
    text: &'a str,
    /// Byte offset of every char boundary, plus the end
    boundaries: Vec<usize>,
}

impl<'a> CharText<'a> {
    fn new(text: &'a str) -> Self {
        let boundaries = text
            .char_indices()
            .map(|(index, _)| index)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { text, boundaries }
    }

    fn len(&self) -> usize {
        self.boundaries.len() - 1
    }

    fn slice(&self, range: OffsetRange) -> &'a str {
        let start = self.boundaries[range.start.min(self.len())];
        let end = self.boundaries[range.end.min(self.len())];
        &self.text[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::SemanticRegion;
    use serde_json::json;

    fn schema(strategy: &str) -> DocumentSchema {
        let mut child = Section::new("s1.1", "Detail", 2)
            .with_range(10, 20)
            .with_type("detail");
        child.parent = Some("s1".to_string());

        let mut schema = DocumentSchema::new("doc", "text")
            .with_sections(vec![
                Section::new("s1", "Intro", 1).with_range(0, 20).with_type("introduction"),
                child,
                Section::new("s2", "Body", 1).with_range(20, 40).with_type("body"),
            ])
            .with_attribute("lang", "en");
        schema.semantic_regions.push(SemanticRegion {
            id: "r1".to_string(),
            region_type: "example".to_string(),
            boundaries: vec![OffsetRange::new(25, 30)],
            ..Default::default()
        });
        schema.chunking_strategy = strategy.to_string();
        schema
    }

    const CONTENT: &str = "0123456789abcdefghijKLMNOPQRSTUVWXYZ!@#$";

    #[test]
    fn test_section_strategy() {
        let chunks = SchemaChunker::default().chunk(CONTENT, &schema("section"));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "doc#0");
        assert_eq!(chunks[0].content, "0123456789abcdefghij");
        assert_eq!(chunks[0].metadata[META_SECTION_TYPE], "introduction");
        assert_eq!(chunks[0].metadata["lang"], "en");
        assert_eq!(chunks[1].metadata[META_SEMANTIC_TAGS], json!(["example"]));
        assert!(chunks[0].metadata.get(META_SEMANTIC_TAGS).is_none());
    }

    #[test]
    fn test_hierarchical_strategy_uses_leaves() {
        let chunks = SchemaChunker::default().chunk(CONTENT, &schema("hierarchical"));
        let ids: Vec<_> = chunks
            .iter()
            .map(|c| c.metadata[META_SECTION_ID].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["s1.1", "s2"]);
        assert_eq!(chunks[0].metadata[META_HIERARCHY_PATH], "Intro > Detail");
        assert_eq!(chunks[0].document_id(), "doc");
    }

    #[test]
    fn test_fixed_windows_overlap() {
        let chunker = SchemaChunker::new(16, 4);
        let chunks = chunker.chunk(CONTENT, &schema("fixed"));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, &CONTENT[0..16]);
        assert_eq!(chunks[1].content, &CONTENT[12..28]);
        assert_eq!(chunks[2].content, &CONTENT[24..40]);
    }

    #[test]
    fn test_no_sections_falls_back_to_windows() {
        let schema = DocumentSchema::new("plain", "text");
        let chunks = SchemaChunker::new(10, 0).chunk("aaaaaaaaaabbbbb", &schema);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].metadata.get(META_SECTION_ID).is_none());
    }

    #[test]
    fn test_multibyte_offsets() {
        let schema = DocumentSchema::new("u", "text")
            .with_sections(vec![Section::new("s", "S", 1).with_range(1, 3)]);
        let chunks = SchemaChunker::default().chunk("héllo", &schema);
        assert_eq!(chunks[0].content, "él");
    }
}

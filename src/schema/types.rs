//! Document schema data model
//!
//! Sections and semantic regions are independent overlays on the same
//! document: their offset ranges are document-relative and may overlap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parsing::{lenient_strings, lenient_text};

/// Provenance tag for schemas instantiated from a pattern
pub const PROVENANCE_PATTERN: &str = "pattern";
/// Provenance tag for schemas produced by structural analysis
pub const PROVENANCE_LLM: &str = "llm";
/// Provenance tag for pattern schemas refined by structural analysis
pub const PROVENANCE_HYBRID: &str = "hybrid";

/// Recommended chunking strategy when none is given
pub const DEFAULT_CHUNKING_STRATEGY: &str = "section";

/// Half-open character range `[start, end)` within a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
}

impl OffsetRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &OffsetRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One structural section of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Nesting level, 1 for top-level sections
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub range: OffsetRange,
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    pub section_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub children: Vec<String>,
}

fn default_level() -> u32 {
    1
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, level: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            level,
            ..Default::default()
        }
    }

    pub fn with_range(mut self, start: usize, end: usize) -> Self {
        self.range = OffsetRange::new(start, end);
        self
    }

    pub fn with_type(mut self, section_type: impl Into<String>) -> Self {
        self.section_type = Some(section_type.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Node in the synthesized section hierarchy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

/// Section hierarchy under a synthetic root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyTree {
    pub root: HierarchyNode,
    #[serde(default)]
    pub max_depth: u32,
}

impl Default for HierarchyTree {
    fn default() -> Self {
        Self {
            root: HierarchyNode {
                id: "root".to_string(),
                title: String::new(),
                level: 0,
                children: Vec::new(),
            },
            max_depth: 0,
        }
    }
}

impl HierarchyTree {
    /// Root whose direct children are the level-1 sections; depth is the
    /// highest level seen
    pub fn from_sections(sections: &[Section]) -> Self {
        let mut tree = Self::default();
        tree.root.children = sections
            .iter()
            .filter(|section| section.level == 1)
            .map(|section| HierarchyNode {
                id: section.id.clone(),
                title: section.title.clone(),
                level: section.level,
                children: Vec::new(),
            })
            .collect();
        tree.max_depth = sections.iter().map(|s| s.level).max().unwrap_or(0);
        tree
    }
}

/// A semantically coherent span, possibly discontiguous
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticRegion {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub region_type: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub boundaries: Vec<OffsetRange>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

impl SemanticRegion {
    pub fn overlaps(&self, range: &OffsetRange) -> bool {
        self.boundaries.iter().any(|b| b.overlaps(range))
    }
}

/// Structural description of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSchema {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub hierarchy: HierarchyTree,
    #[serde(default)]
    pub semantic_regions: Vec<SemanticRegion>,
    #[serde(default)]
    pub custom_attributes: Map<String, Value>,
    #[serde(default = "default_chunking_strategy")]
    pub chunking_strategy: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub provenance: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_chunking_strategy() -> String {
    DEFAULT_CHUNKING_STRATEGY.to_string()
}

impl Default for DocumentSchema {
    fn default() -> Self {
        Self {
            document_id: String::new(),
            format: String::new(),
            title: None,
            sections: Vec::new(),
            hierarchy: HierarchyTree::default(),
            semantic_regions: Vec::new(),
            custom_attributes: Map::new(),
            chunking_strategy: default_chunking_strategy(),
            confidence: 0.0,
            provenance: String::new(),
            created_at: Utc::now(),
        }
    }
}

impl DocumentSchema {
    pub fn new(document_id: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            format: format.into(),
            ..Default::default()
        }
    }

    pub fn with_sections(mut self, sections: Vec<Section>) -> Self {
        self.hierarchy = HierarchyTree::from_sections(&sections);
        self.sections = sections;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }

    /// Section titles from the root down to `id`, following parent links
    pub fn section_path(&self, id: &str) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self.section(id);
        while let Some(section) = current {
            if path.len() > self.sections.len() {
                // Parent cycle
                break;
            }
            path.push(section.title.clone());
            current = section.parent.as_deref().and_then(|parent| self.section(parent));
        }
        path.reverse();
        path
    }
}

/// Reusable schema template selected by indicator keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaPattern {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub indicators: Vec<String>,
    /// Higher priorities are tried first
    #[serde(default)]
    pub priority: i32,
    /// Refine the instantiated template with structural analysis
    #[serde(default)]
    pub enhance: bool,
    pub template: DocumentSchema,
}

impl SchemaPattern {
    /// Fraction of indicators present in `content` (case-insensitive)
    pub fn match_confidence(&self, content: &str) -> f32 {
        if self.indicators.is_empty() {
            return 0.0;
        }
        let haystack = content.to_lowercase();
        let found = self
            .indicators
            .iter()
            .filter(|indicator| haystack.contains(&indicator.to_lowercase()))
            .count();
        found as f32 / self.indicators.len() as f32
    }

    /// Copy of the template stamped for a concrete document
    pub fn instantiate(&self, document_id: &str, format: &str) -> DocumentSchema {
        let mut schema = self.template.clone();
        schema.document_id = document_id.to_string();
        schema.format = format.to_string();
        schema.created_at = Utc::now();
        schema.provenance = PROVENANCE_PATTERN.to_string();
        if schema.hierarchy.root.children.is_empty() && !schema.sections.is_empty() {
            schema.hierarchy = HierarchyTree::from_sections(&schema.sections);
        }
        schema
    }
}

/// How a schema was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Explicit,
    Pattern,
    Llm,
    Hybrid,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Explicit => "explicit",
            ResolutionStrategy::Pattern => "pattern",
            ResolutionStrategy::Llm => "llm",
            ResolutionStrategy::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of schema resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub schema: DocumentSchema,
    pub strategy: ResolutionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_name: Option<String>,
    pub confidence: f32,
    pub processing_time_ms: u64,
}

//! Schema pattern registry
//!
//! Patterns are tried in descending priority; equal priorities keep
//! registration order. Replacing a pattern by name keeps its original
//! registration slot.
//!
//! Built-in patterns (`with_defaults`):
//! - academic_paper: abstract/introduction/methods/results/references
//! - technical_manual: installation/configuration/troubleshooting
//! - legal_contract: parties/terms/liability/governing law
//! - api_reference: endpoints/parameters/responses

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

use crate::errors::{RagError, Result};
use crate::schema::types::{DocumentSchema, SchemaPattern, Section};

/// Thread-safe store of reusable schema templates
#[derive(Debug, Default)]
pub struct PatternRegistry {
    patterns: RwLock<Vec<SchemaPattern>>,
}

impl PatternRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in patterns
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_academic_paper();
        registry.register_technical_manual();
        registry.register_legal_contract();
        registry.register_api_reference();
        registry
    }

    /// Insert or replace a pattern by name
    pub fn register(&self, pattern: SchemaPattern) -> Result<()> {
        if pattern.name.trim().is_empty() {
            return Err(RagError::Resolution(
                "schema pattern name must not be empty".to_string(),
            ));
        }

        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        match patterns.iter_mut().find(|p| p.name == pattern.name) {
            Some(existing) => {
                debug!(pattern = %pattern.name, "replacing schema pattern");
                *existing = pattern;
            }
            None => {
                debug!(pattern = %pattern.name, priority = pattern.priority, "registering schema pattern");
                patterns.push(pattern);
            }
        }
        Ok(())
    }

    /// Remove a pattern; returns whether it existed
    pub fn remove(&self, name: &str) -> bool {
        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        let before = patterns.len();
        patterns.retain(|p| p.name != name);
        patterns.len() != before
    }

    pub fn get(&self, name: &str) -> Option<SchemaPattern> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot in match order: priority descending, then registration order
    pub fn ordered(&self) -> Vec<SchemaPattern> {
        let mut patterns = self
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        patterns.sort_by(|a, b| b.priority.cmp(&a.priority));
        patterns
    }

    /// Load every `*.json` pattern file in `dir`; unparsable files are
    /// skipped with a warning. Returns the number registered.
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match Self::read_pattern(&path) {
                Ok(pattern) => {
                    self.register(pattern)?;
                    loaded += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping schema pattern file"),
            }
        }
        Ok(loaded)
    }

    fn read_pattern(path: &Path) -> Result<SchemaPattern> {
        let contents = std::fs::read_to_string(path)?;
        let pattern: SchemaPattern = serde_json::from_str(&contents)?;
        if pattern.name.trim().is_empty() {
            return Err(RagError::Resolution("pattern has an empty name".to_string()));
        }
        Ok(pattern)
    }

    /// Write a registered pattern to `<dir>/<name>.json`
    pub fn save_pattern(&self, name: &str, dir: &Path) -> Result<PathBuf> {
        let pattern = self
            .get(name)
            .ok_or_else(|| RagError::Resolution(format!("unknown schema pattern: {}", name)))?;

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", pattern.name));
        std::fs::write(&path, serde_json::to_string_pretty(&pattern)?)?;
        Ok(path)
    }

    fn register_builtin(&self, pattern: SchemaPattern) {
        // Built-in names are non-empty
        let _ = self.register(pattern);
    }

    /// Register academic_paper pattern
    fn register_academic_paper(&self) {
        let template = DocumentSchema::default()
            .with_sections(vec![
                Section::new("abstract", "Abstract", 1).with_type("abstract"),
                Section::new("introduction", "Introduction", 1).with_type("introduction"),
                Section::new("methods", "Methods", 1).with_type("methods"),
                Section::new("results", "Results", 1).with_type("results"),
                Section::new("discussion", "Discussion", 1).with_type("discussion"),
                Section::new("references", "References", 1).with_type("references"),
            ])
            .with_attribute("document_type", "academic_paper");

        self.register_builtin(SchemaPattern {
            name: "academic_paper".to_string(),
            description: "Research paper with abstract, methods, results and references"
                .to_string(),
            indicators: strings(&["abstract", "introduction", "methods", "results", "references"]),
            priority: 10,
            enhance: true,
            template: DocumentSchema {
                chunking_strategy: "section".to_string(),
                confidence: 0.8,
                ..template
            },
        });
    }

    /// Register technical_manual pattern
    fn register_technical_manual(&self) {
        let template = DocumentSchema::default()
            .with_sections(vec![
                Section::new("overview", "Overview", 1).with_type("overview"),
                Section::new("installation", "Installation", 1).with_type("procedure"),
                Section::new("configuration", "Configuration", 1).with_type("reference"),
                Section::new("troubleshooting", "Troubleshooting", 1).with_type("troubleshooting"),
            ])
            .with_attribute("document_type", "technical_manual");

        self.register_builtin(SchemaPattern {
            name: "technical_manual".to_string(),
            description: "Product or system manual with setup and troubleshooting steps"
                .to_string(),
            indicators: strings(&["installation", "configuration", "troubleshooting", "requirements"]),
            priority: 8,
            enhance: false,
            template: DocumentSchema {
                chunking_strategy: "hierarchical".to_string(),
                confidence: 0.75,
                ..template
            },
        });
    }

    /// Register legal_contract pattern
    fn register_legal_contract(&self) {
        let template = DocumentSchema::default()
            .with_sections(vec![
                Section::new("parties", "Parties", 1).with_type("parties"),
                Section::new("definitions", "Definitions", 1).with_type("definitions"),
                Section::new("terms", "Terms and Conditions", 1).with_type("terms"),
                Section::new("liability", "Limitation of Liability", 1).with_type("liability"),
                Section::new("governing_law", "Governing Law", 1).with_type("governing_law"),
            ])
            .with_attribute("document_type", "legal_contract");

        self.register_builtin(SchemaPattern {
            name: "legal_contract".to_string(),
            description: "Agreement between parties with clauses and obligations".to_string(),
            indicators: strings(&["agreement", "parties", "whereas", "liability", "governing law"]),
            priority: 9,
            enhance: false,
            template: DocumentSchema {
                chunking_strategy: "section".to_string(),
                confidence: 0.8,
                ..template
            },
        });
    }

    /// Register api_reference pattern
    fn register_api_reference(&self) {
        let template = DocumentSchema::default()
            .with_sections(vec![
                Section::new("authentication", "Authentication", 1).with_type("authentication"),
                Section::new("endpoints", "Endpoints", 1).with_type("endpoint"),
                Section::new("errors", "Errors", 1).with_type("errors"),
            ])
            .with_attribute("document_type", "api_reference");

        self.register_builtin(SchemaPattern {
            name: "api_reference".to_string(),
            description: "HTTP API documentation with endpoints, parameters and responses"
                .to_string(),
            indicators: strings(&["endpoint", "request", "response", "parameters", "status code"]),
            priority: 7,
            enhance: false,
            template: DocumentSchema {
                chunking_strategy: "section".to_string(),
                confidence: 0.75,
                ..template
            },
        });
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

//! TTL cache of resolved schemas keyed by document id
//!
//! Expiry is checked lazily on read; writes overwrite. Safe for concurrent
//! readers and writers.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::schema::types::{DocumentSchema, ResolutionResult};

/// Default time-to-live of cached resolutions
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ResolutionResult,
    inserted_at: Instant,
}

/// Memo of resolution results
#[derive(Debug)]
pub struct SchemaCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached result if present and not expired; expired entries are evicted
    pub fn get(&self, document_id: &str) -> Option<ResolutionResult> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(document_id) {
                None => return None,
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.result.clone())
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(document_id)
            .is_some_and(|entry| entry.inserted_at.elapsed() >= self.ttl)
        {
            entries.remove(document_id);
        }
        None
    }

    /// Schema of a live entry
    pub fn schema(&self, document_id: &str) -> Option<DocumentSchema> {
        self.get(document_id).map(|result| result.schema)
    }

    pub fn insert(&self, document_id: impl Into<String>, result: ResolutionResult) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                document_id.into(),
                CacheEntry {
                    result,
                    inserted_at: Instant::now(),
                },
            );
    }

    pub fn invalidate(&self, document_id: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(document_id)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ResolutionStrategy;
    use std::sync::Arc;

    fn result(id: &str) -> ResolutionResult {
        ResolutionResult {
            schema: DocumentSchema::new(id, "text"),
            strategy: ResolutionStrategy::Llm,
            pattern_name: None,
            confidence: 0.7,
            processing_time_ms: 12,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = SchemaCache::default();
        cache.insert("d1", result("d1"));
        assert_eq!(cache.get("d1").unwrap().schema.document_id, "d1");
        assert!(cache.get("d2").is_none());
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = SchemaCache::new(Duration::from_millis(0));
        cache.insert("d1", result("d1"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("d1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_and_invalidate() {
        let cache = SchemaCache::default();
        cache.insert("d1", result("d1"));
        let mut replacement = result("d1");
        replacement.confidence = 0.9;
        cache.insert("d1", replacement);
        assert_eq!(cache.get("d1").unwrap().confidence, 0.9);
        assert!(cache.invalidate("d1"));
        assert!(cache.get("d1").is_none());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(SchemaCache::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let id = format!("doc-{}", i);
                    cache.insert(id.clone(), result(&id));
                    cache.get(&id).is_some()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(cache.len(), 8);
    }
}

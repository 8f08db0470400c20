//! LRU cache of successful remote responses.

use crate::acquire_lock;
use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Methods with side effects are never cached.
const UNCACHEABLE_METHODS: &[&str] = &["store"];

#[derive(Debug, Clone)]
struct CachedResponse {
    result: Value,
    stored_at: Instant,
}

/// Response cache keyed by a hash of (component, method, args).
///
/// Expired entries stay in the LRU so the stale-response fallback stage can
/// still serve them while a component is down.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Option<Mutex<LruCache<String, CachedResponse>>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Creates a cache. Capacity 0 disables caching.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            ttl,
        }
    }

    /// Stable key for a call.
    #[must_use]
    pub fn key(component: &str, method: &str, args: &[Value]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(component.as_bytes());
        hasher.update([0]);
        hasher.update(method.as_bytes());
        hasher.update([0]);
        for arg in args {
            hasher.update(arg.to_string().as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }

    /// Whether responses from this method may be cached.
    #[must_use]
    pub fn is_cacheable(method: &str) -> bool {
        !UNCACHEABLE_METHODS.contains(&method)
    }

    /// Returns a fresh cached result.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.as_ref()?;
        let mut cache = acquire_lock(entries);
        let entry = cache.get(key)?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.result.clone())
    }

    /// Returns a cached result regardless of age.
    #[must_use]
    pub fn get_stale(&self, key: &str) -> Option<Value> {
        let entries = self.entries.as_ref()?;
        let mut cache = acquire_lock(entries);
        cache.get(key).map(|entry| entry.result.clone())
    }

    /// Stores a result.
    pub fn put(&self, key: String, result: Value) {
        if let Some(entries) = &self.entries {
            acquire_lock(entries).put(
                key,
                CachedResponse {
                    result,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    /// Number of cached responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .map_or(0, |entries| acquire_lock(entries).len())
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            acquire_lock(entries).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_depends_on_every_part() {
        let base = ResponseCache::key("embedding", "embed", &[json!("a")]);
        assert_eq!(base, ResponseCache::key("embedding", "embed", &[json!("a")]));
        assert_ne!(base, ResponseCache::key("embedding", "embed", &[json!("b")]));
        assert_ne!(base, ResponseCache::key("embedding", "embed_batch", &[json!("a")]));
        assert_ne!(base, ResponseCache::key("summarizer", "embed", &[json!("a")]));
    }

    #[test]
    fn test_expired_entries_are_stale_only() {
        let cache = ResponseCache::new(4, Duration::ZERO);
        cache.put("k".to_string(), json!(1));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.get_stale("k"), Some(json!(1)));
    }

    #[test]
    fn test_capacity_zero_disables() {
        let cache = ResponseCache::new(0, Duration::from_secs(60));
        cache.put("k".to_string(), json!(1));
        assert!(cache.is_empty());
        assert_eq!(cache.get_stale("k"), None);
    }

    #[test]
    fn test_store_is_uncacheable() {
        assert!(!ResponseCache::is_cacheable("store"));
        assert!(ResponseCache::is_cacheable("embed"));
    }
}

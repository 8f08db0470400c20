//! Intelligent result cache.
//!
//! Three tiers are consulted in order on [`IntelligentCache::get`]:
//!
//! 1. **Exact**: in-memory entries keyed by [`CacheKey::as_str`], with an
//!    adaptive TTL that lengthens as the entry is hit (1.0x / 1.2x / 1.5x /
//!    2.0x at 2 / 5 / 10 hits). Large payloads are zstd-compressed when that
//!    saves at least the configured fraction.
//! 2. **Preload**: entries keyed by the query pattern, so a reworded query
//!    can hit before its own exact entry exists. They live half the base TTL.
//! 3. **Disk**: optional persisted records, purged lazily once expired. A disk
//!    hit is promoted back into memory with the lifetime the record has left.
//!
//! When the exact tier grows past capacity, entries are evicted lowest
//! `access_frequency / (age + 1)` first until occupancy is back to the target
//! ratio. Every I/O or codec failure degrades to a miss.

mod entry;
mod key;
mod persist;

pub use entry::{CacheEntry, eviction_score, ttl_multiplier};
pub use key::{CacheKey, query_pattern};
pub use persist::{PersistedRecord, RecordStore, now_millis};

use crate::acquire_lock;
use crate::config::CacheConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Exact-tier hits.
    pub hits: u64,
    /// Preload-tier hits.
    pub preload_hits: u64,
    /// Disk-tier hits.
    pub disk_hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed by capacity pressure.
    pub evictions: u64,
    /// Entries removed because their TTL ran out.
    pub expirations: u64,
    /// Entries stored compressed.
    pub compressed_entries: u64,
    /// Bytes saved by compression over all stores.
    pub bytes_saved: u64,
    /// I/O and codec failures degraded to misses.
    pub io_errors: u64,
    /// Live exact entries.
    pub entries: usize,
    /// Live preload entries.
    pub preload_entries: usize,
}

impl CacheStats {
    /// Fraction of lookups answered by any tier.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits + self.preload_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct PreloadEntry {
    value: Value,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    preload: HashMap<String, PreloadEntry>,
    stats: CacheStats,
}

/// Adaptive-TTL, compressed, capacity-bounded cache.
#[derive(Debug)]
pub struct IntelligentCache {
    config: CacheConfig,
    base_ttl: Duration,
    records: Option<RecordStore>,
    state: Mutex<CacheState>,
}

impl IntelligentCache {
    /// Creates a cache from configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            base_ttl: config.base_ttl(),
            records: config.persist_dir.as_ref().map(RecordStore::new),
            config: config.clone(),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Overrides the base TTL with sub-second precision.
    #[must_use]
    pub const fn with_base_ttl(mut self, base_ttl: Duration) -> Self {
        self.base_ttl = base_ttl;
        self
    }

    /// Whether the cache is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Base TTL.
    #[must_use]
    pub const fn base_ttl(&self) -> Duration {
        self.base_ttl
    }

    /// Looks a key up in the exact, preload and disk tiers.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        if !self.config.enabled {
            return None;
        }
        let now = Instant::now();
        let mut state = acquire_lock(&self.state);

        if let Some(value) = Self::get_exact(&mut state, key.as_str(), now) {
            state.stats.hits += 1;
            record_lookup("exact");
            return Some(value);
        }

        if self.config.preload_enabled {
            if let Some(value) = self.get_preloaded(&mut state, key, now) {
                state.stats.preload_hits += 1;
                record_lookup("preload");
                return Some(value);
            }
        }

        if let Some(value) = self.get_persisted(&mut state, key, now) {
            state.stats.disk_hits += 1;
            record_lookup("disk");
            return Some(value);
        }

        state.stats.misses += 1;
        record_lookup("miss");
        None
    }

    fn get_exact(state: &mut CacheState, key: &str, now: Instant) -> Option<Value> {
        let entry = state.entries.get_mut(key)?;
        if entry.is_expired(now) {
            state.entries.remove(key);
            state.stats.expirations += 1;
            return None;
        }
        entry.touch(now);
        let decoded = entry
            .decode()
            .and_then(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| crate::Error::CacheIo(e.to_string()))
            });
        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "dropping unreadable cache entry");
                state.entries.remove(key);
                state.stats.io_errors += 1;
                None
            },
        }
    }

    fn get_preloaded(&self, state: &mut CacheState, key: &CacheKey, now: Instant) -> Option<Value> {
        let pattern = key.pattern()?;
        let entry = state.preload.get(pattern)?;
        if now.saturating_duration_since(entry.stored_at) >= self.preload_ttl() {
            state.preload.remove(pattern);
            state.stats.expirations += 1;
            return None;
        }
        Some(entry.value.clone())
    }

    fn get_persisted(&self, state: &mut CacheState, key: &CacheKey, now: Instant) -> Option<Value> {
        let records = self.records.as_ref()?;
        match records.read(key.as_str()) {
            Ok(Some(record)) => {
                let age = record.age(now_millis());
                if age >= record.ttl() {
                    return None;
                }
                // Backdate so the memory copy expires with the record.
                let (created_at, ttl_base) = match now.checked_sub(age) {
                    Some(created_at) => (created_at, record.ttl()),
                    None => (now, record.ttl().saturating_sub(age)),
                };
                self.insert_exact(state, key.as_str(), &record.result, created_at, ttl_base);
                Some(record.result)
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "persisted cache record unreadable, treating as miss");
                records.remove(key.as_str());
                state.stats.io_errors += 1;
                None
            },
        }
    }

    /// Stores a value under the exact key, its preload pattern and, when
    /// configured, on disk.
    pub fn put(&self, key: &CacheKey, value: &Value) {
        if !self.config.enabled {
            return;
        }
        let now = Instant::now();
        let mut state = acquire_lock(&self.state);

        self.insert_exact(&mut state, key.as_str(), value, now, self.base_ttl);

        if self.config.preload_enabled {
            if let Some(pattern) = key.pattern() {
                state.preload.insert(
                    pattern.to_string(),
                    PreloadEntry {
                        value: value.clone(),
                        stored_at: now,
                    },
                );
            }
        }

        if let Some(records) = &self.records {
            if let Err(e) = records.write(key.as_str(), value, self.base_ttl) {
                tracing::warn!(error = %e, "failed to persist cache record");
                state.stats.io_errors += 1;
            }
        }

        self.enforce_capacity(&mut state, now);
        state.stats.entries = state.entries.len();
        state.stats.preload_entries = state.preload.len();
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("cache_entries").set(state.entries.len() as f64);
    }

    fn insert_exact(
        &self,
        state: &mut CacheState,
        key: &str,
        value: &Value,
        created_at: Instant,
        ttl_base: Duration,
    ) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "cache value not serializable, skipping");
                state.stats.io_errors += 1;
                return;
            },
        };
        let mut entry = CacheEntry::encode(
            bytes,
            self.config.compression_threshold_bytes,
            self.config.min_compression_savings,
            ttl_base,
        );
        entry.created_at = created_at;
        entry.last_access = created_at;
        if entry.compressed {
            state.stats.compressed_entries += 1;
            state.stats.bytes_saved += entry.bytes_saved() as u64;
        }
        state.entries.insert(key.to_string(), entry);
    }

    /// Drops expired entries, then evicts lowest-scoring entries until the
    /// exact tier is at the target occupancy.
    fn enforce_capacity(&self, state: &mut CacheState, now: Instant) {
        let preload_ttl = self.preload_ttl();
        state
            .preload
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) < preload_ttl);

        let capacity = self.config.capacity;
        if state.entries.len() <= capacity {
            return;
        }

        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        state.stats.expirations += (before - state.entries.len()) as u64;
        if state.entries.len() <= capacity {
            return;
        }

        let target = target_occupancy(capacity, self.config.eviction_target_ratio);
        let mut ranked: Vec<(String, f64, Instant)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.score(now), entry.created_at))
            .collect();
        ranked.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        let excess = state.entries.len().saturating_sub(target);
        for (key, _, _) in ranked.into_iter().take(excess) {
            state.entries.remove(&key);
        }
        state.stats.evictions += excess as u64;
        metrics::counter!("cache_evictions_total").increment(excess as u64);
        tracing::debug!(evicted = excess, remaining = state.entries.len(), "cache eviction");
    }

    fn preload_ttl(&self) -> Duration {
        self.base_ttl / 2
    }

    /// Removes one exact entry (memory and disk).
    pub fn invalidate(&self, key: &CacheKey) {
        acquire_lock(&self.state).entries.remove(key.as_str());
        if let Some(records) = &self.records {
            records.remove(key.as_str());
        }
    }

    /// Clears the in-memory tiers. Persisted records stay for the next run.
    pub fn clear_memory(&self) {
        let mut state = acquire_lock(&self.state);
        Self::clear_tiers(&mut state);
    }

    /// Clears every tier, persisted records included.
    pub fn clear(&self) {
        let mut state = acquire_lock(&self.state);
        Self::clear_tiers(&mut state);
        if let Some(records) = &self.records {
            match records.clear() {
                Ok(removed) => tracing::debug!(removed, "persisted cache records cleared"),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to clear persisted cache records");
                    state.stats.io_errors += 1;
                },
            }
        }
    }

    fn clear_tiers(state: &mut CacheState) {
        state.entries.clear();
        state.preload.clear();
        state.stats.entries = 0;
        state.stats.preload_entries = 0;
    }

    /// Number of live exact entries.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.state).entries.len()
    }

    /// Whether the exact tier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = acquire_lock(&self.state);
        CacheStats {
            entries: state.entries.len(),
            preload_entries: state.preload.len(),
            ..state.stats
        }
    }
}

/// Entries kept after eviction: `floor(capacity * ratio)`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn target_occupancy(capacity: usize, ratio: f64) -> usize {
    ((capacity as f64) * ratio).floor() as usize
}

fn record_lookup(tier: &'static str) {
    if tier == "miss" {
        metrics::counter!("cache_misses_total").increment(1);
    } else {
        metrics::counter!("cache_hits_total", "tier" => tier).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Context, Query};
    use serde_json::json;

    fn key(text: &str) -> CacheKey {
        CacheKey::new(&Query::from(text), &Context::new(), "cfg", 3)
    }

    fn cache(capacity: usize) -> IntelligentCache {
        IntelligentCache::new(&CacheConfig {
            capacity,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn test_put_then_get_returns_identical_value() {
        let cache = cache(10);
        let value = json!({"results": [1, 2, 3], "text": "x".repeat(5_000)});
        cache.put(&key("retry logic"), &value);
        assert_eq!(cache.get(&key("retry logic")), Some(value));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().compressed_entries, 1);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = cache(10).with_base_ttl(Duration::from_millis(40));
        let k = key("retry logic");
        cache.put(&k, &json!(1));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&k), None);
        assert_eq!(cache.stats().expirations, 2);
    }

    #[test]
    fn test_preload_serves_reworded_query() {
        let cache = cache(10);
        cache.put(&key("retry logic for database"), &json!("answer"));
        assert_eq!(cache.get(&key("database retry logic")), Some(json!("answer")));
        assert_eq!(cache.stats().preload_hits, 1);
    }

    #[test]
    fn test_preload_expires_at_half_ttl() {
        let cache = cache(10).with_base_ttl(Duration::from_millis(200));
        cache.put(&key("retry logic for database"), &json!("answer"));
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&key("database retry logic")), None);
        assert!(cache.get(&key("retry logic for database")).is_some());
    }

    #[test]
    fn test_eviction_shrinks_to_target_and_keeps_hot_entries() {
        let cache = cache(5);
        for i in 0..5 {
            cache.put(&CacheKey::raw(format!("k{i}")), &json!(i));
        }
        for _ in 0..3 {
            assert!(cache.get(&CacheKey::raw("k4")).is_some());
        }
        cache.put(&CacheKey::raw("k5"), &json!(5));

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.stats().evictions, 2);
        assert!(cache.get(&CacheKey::raw("k4")).is_some());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = IntelligentCache::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        cache.put(&key("q"), &json!(1));
        assert_eq!(cache.get(&key("q")), None);
        assert!(cache.is_empty());
    }

    fn persisted(dir: &std::path::Path) -> IntelligentCache {
        IntelligentCache::new(&CacheConfig {
            persist_dir: Some(dir.to_path_buf()),
            preload_enabled: false,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn test_disk_tier_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("persisted query");
        persisted(dir.path()).put(&k, &json!({"ok": true}));

        let restarted = persisted(dir.path());
        assert_eq!(restarted.get(&k), Some(json!({"ok": true})));
        assert_eq!(restarted.stats().disk_hits, 1);
        assert_eq!(restarted.len(), 1);
    }

    #[test]
    fn test_clear_memory_keeps_persisted_records() {
        let dir = tempfile::tempdir().unwrap();
        let cache = persisted(dir.path());
        let k = key("persisted query");
        cache.put(&k, &json!({"ok": true}));
        cache.clear_memory();

        assert!(cache.is_empty());
        assert_eq!(cache.get(&k), Some(json!({"ok": true})));
        assert_eq!(cache.stats().disk_hits, 1);
    }

    #[test]
    fn test_clear_drops_persisted_records() {
        let dir = tempfile::tempdir().unwrap();
        let cache = persisted(dir.path());
        let k = key("persisted query");
        cache.put(&k, &json!({"ok": true}));
        cache.clear();

        assert_eq!(cache.get(&k), None);
        assert_eq!(cache.stats().disk_hits, 0);
        assert_eq!(persisted(dir.path()).get(&k), None);
    }

    #[test]
    fn test_promoted_record_keeps_its_original_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_millis(400);
        let k = key("persisted query");
        persisted(dir.path()).with_base_ttl(ttl).put(&k, &json!(1));

        std::thread::sleep(Duration::from_millis(250));
        let restarted = persisted(dir.path()).with_base_ttl(ttl);
        assert_eq!(restarted.get(&k), Some(json!(1)));
        assert_eq!(restarted.stats().disk_hits, 1);

        // Past the record's lifetime, although the promotion was recent.
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(restarted.get(&k), None);
        assert_eq!(restarted.stats().disk_hits, 1);
    }

    #[test]
    fn test_frequent_hits_extend_lifetime() {
        let cache = cache(10).with_base_ttl(Duration::from_millis(200));
        let hot = CacheKey::raw("hot");
        let cold = CacheKey::raw("cold");
        cache.put(&hot, &json!("hot"));
        cache.put(&cold, &json!("cold"));
        for _ in 0..10 {
            assert!(cache.get(&hot).is_some());
        }

        // Base TTL has passed; ten hits doubled the hot entry's lifetime.
        std::thread::sleep(Duration::from_millis(260));
        assert_eq!(cache.get(&cold), None);
        assert_eq!(cache.get(&hot), Some(json!("hot")));
    }

    #[test]
    fn test_invalidate_and_hit_rate() {
        let cache = cache(10);
        let k = key("alpha beta");
        cache.put(&k, &json!(1));
        assert!(cache.get(&k).is_some());
        cache.invalidate(&k);
        assert!(cache.get(&CacheKey::raw("other")).is_none());
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_target_occupancy() {
        assert_eq!(target_occupancy(1_000, 0.8), 800);
        assert_eq!(target_occupancy(5, 0.8), 4);
        assert_eq!(target_occupancy(1, 0.8), 0);
    }
}

//! Cache entries: adaptive TTL, eviction score and payload compression.

use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Access counts at which the TTL multiplier steps up.
const TTL_TIERS: [(u32, f64); 3] = [(10, 2.0), (5, 1.5), (2, 1.2)];

/// zstd level for cache payloads.
const COMPRESSION_LEVEL: i32 = 3;

/// TTL multiplier for an access count: 1.0 below 2, then 1.2 / 1.5 / 2.0 at
/// 2 / 5 / 10 accesses.
#[must_use]
pub fn ttl_multiplier(access_frequency: u32) -> f64 {
    TTL_TIERS
        .iter()
        .find(|(threshold, _)| access_frequency >= *threshold)
        .map_or(1.0, |(_, multiplier)| *multiplier)
}

/// Eviction score `access_frequency / (age_secs + 1)`. Lower is evicted first.
#[must_use]
pub fn eviction_score(access_frequency: u32, age: Duration) -> f64 {
    f64::from(access_frequency) / (age.as_secs_f64() + 1.0)
}

/// A stored consultation result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized payload, possibly compressed.
    pub payload: Vec<u8>,
    /// Whether `payload` is zstd-compressed.
    pub compressed: bool,
    /// Serialized size before compression.
    pub original_size: usize,
    /// Creation instant.
    pub created_at: Instant,
    /// Last hit.
    pub last_access: Instant,
    /// Number of hits.
    pub access_frequency: u32,
    /// TTL before the access multiplier.
    pub ttl_base: Duration,
}

impl CacheEntry {
    /// Encodes `bytes`, compressing them when they exceed `threshold` and the
    /// compressed form is at least `min_savings` smaller.
    #[must_use]
    pub fn encode(bytes: Vec<u8>, threshold: usize, min_savings: f64, ttl_base: Duration) -> Self {
        let original_size = bytes.len();
        let now = Instant::now();
        let (payload, compressed) = if original_size > threshold {
            match compress_if_smaller(&bytes, min_savings) {
                Some(packed) => (packed, true),
                None => (bytes, false),
            }
        } else {
            (bytes, false)
        };
        Self {
            payload,
            compressed,
            original_size,
            created_at: now,
            last_access: now,
            access_frequency: 0,
            ttl_base,
        }
    }

    /// Serialized bytes, decompressed if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheIo`] if decompression fails.
    pub fn decode(&self) -> Result<Vec<u8>> {
        if self.compressed {
            zstd::decode_all(self.payload.as_slice())
                .map_err(|e| Error::CacheIo(format!("decompress: {e}")))
        } else {
            Ok(self.payload.clone())
        }
    }

    /// `ttl_base * ttl_multiplier(access_frequency)`.
    #[must_use]
    pub fn effective_ttl(&self) -> Duration {
        self.ttl_base.mul_f64(ttl_multiplier(self.access_frequency))
    }

    /// Whether the entry has outlived its effective TTL.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.effective_ttl()
    }

    /// Eviction score at `now`.
    #[must_use]
    pub fn score(&self, now: Instant) -> f64 {
        eviction_score(
            self.access_frequency,
            now.saturating_duration_since(self.created_at),
        )
    }

    /// Records a hit.
    pub fn touch(&mut self, now: Instant) {
        self.access_frequency = self.access_frequency.saturating_add(1);
        self.last_access = now;
    }

    /// Bytes saved by compression.
    #[must_use]
    pub fn bytes_saved(&self) -> usize {
        self.original_size.saturating_sub(self.payload.len())
    }
}

/// Compresses `bytes`, returning the result only if it saves at least
/// `min_savings` of the original size.
fn compress_if_smaller(bytes: &[u8], min_savings: f64) -> Option<Vec<u8>> {
    let packed = match zstd::encode_all(bytes, COMPRESSION_LEVEL) {
        Ok(packed) => packed,
        Err(e) => {
            tracing::warn!(error = %e, "cache compression failed, storing raw");
            return None;
        },
    };
    #[allow(clippy::cast_precision_loss)]
    let savings = 1.0 - packed.len() as f64 / bytes.len() as f64;
    (savings >= min_savings).then_some(packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 1.0 ; "never accessed")]
    #[test_case(1, 1.0 ; "below first tier")]
    #[test_case(2, 1.2 ; "first tier")]
    #[test_case(4, 1.2 ; "still first tier")]
    #[test_case(5, 1.5 ; "second tier")]
    #[test_case(10, 2.0 ; "top tier")]
    #[test_case(500, 2.0 ; "capped")]
    fn test_ttl_multiplier(frequency: u32, expected: f64) {
        assert!((ttl_multiplier(frequency) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_eviction_score_prefers_frequent_and_young() {
        let young_hot = eviction_score(10, Duration::from_secs(1));
        let old_hot = eviction_score(10, Duration::from_secs(100));
        let young_cold = eviction_score(1, Duration::from_secs(1));
        assert!(young_hot > old_hot);
        assert!(young_hot > young_cold);
        assert!(eviction_score(0, Duration::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compressible_payload_is_compressed() {
        let bytes = "a".repeat(4_096).into_bytes();
        let entry = CacheEntry::encode(bytes.clone(), 1_024, 0.2, Duration::from_secs(60));
        assert!(entry.compressed);
        assert!(entry.bytes_saved() > 0);
        assert_eq!(entry.decode().unwrap(), bytes);
    }

    #[test]
    fn test_small_payload_stays_raw() {
        let bytes = b"{\"x\":1}".to_vec();
        let entry = CacheEntry::encode(bytes.clone(), 1_024, 0.2, Duration::from_secs(60));
        assert!(!entry.compressed);
        assert_eq!(entry.decode().unwrap(), bytes);
    }

    #[test]
    fn test_incompressible_payload_stays_raw() {
        // A byte sequence with no repetition zstd can exploit.
        let mut state: u32 = 0x9E37_79B9;
        let bytes: Vec<u8> = (0..4_096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect();
        let entry = CacheEntry::encode(bytes.clone(), 1_024, 0.2, Duration::from_secs(60));
        assert!(!entry.compressed);
        assert_eq!(entry.payload, bytes);
    }

    #[test]
    fn test_effective_ttl_grows_with_access() {
        let mut entry = CacheEntry::encode(Vec::new(), 1_024, 0.2, Duration::from_secs(100));
        assert_eq!(entry.effective_ttl(), Duration::from_secs(100));
        let now = Instant::now();
        for _ in 0..5 {
            entry.touch(now);
        }
        assert_eq!(entry.effective_ttl(), Duration::from_secs(150));
        assert!(!entry.is_expired(now));
    }
}

//! In-process engine metrics.
//!
//! Counters are measured, never estimated. Each recording also feeds the
//! `metrics` facade so a Prometheus recorder sees the same numbers.

use crate::acquire_lock;
use crate::bridge::BridgeStats;
use crate::cache::CacheStats;
use crate::models::{AggregatedResult, StrategyKind, StrategyResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-strategy counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StrategyCounts {
    /// Runs, including fallback re-runs.
    pub runs: u64,
    /// Successful runs.
    pub successes: u64,
    /// Failed, timed-out or panicked runs.
    pub failures: u64,
    /// Total run time.
    pub total_duration_ms: u64,
}

/// Point-in-time copy of the engine metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineMetricsSnapshot {
    /// Consultations handled.
    pub consultations: u64,
    /// Consultations answered from the result cache.
    pub cache_hits: u64,
    /// Consultations that missed the result cache.
    pub cache_misses: u64,
    /// Primary rounds that fell through to the fallback chain.
    pub fallback_activations: u64,
    /// Fallback chains that recovered.
    pub fallback_recoveries: u64,
    /// Consultations that ended in the ultimate fallback.
    pub ultimate_fallbacks: u64,
    /// Mean consultation latency.
    pub average_latency_ms: f64,
    /// Counters keyed by strategy name.
    pub strategies: BTreeMap<String, StrategyCounts>,
    /// Result cache statistics.
    pub cache: CacheStats,
    /// Bridge statistics.
    pub bridge: BridgeStats,
}

impl EngineMetricsSnapshot {
    /// Fraction of consultations served from cache.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Engine counters owned by one coordinator.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    consultations: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallback_activations: AtomicU64,
    fallback_recoveries: AtomicU64,
    ultimate_fallbacks: AtomicU64,
    total_latency_ms: AtomicU64,
    strategies: Mutex<BTreeMap<StrategyKind, StrategyCounts>>,
}

impl EngineMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cache lookup outcome.
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("consultation_cache_hits_total").increment(1);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("consultation_cache_misses_total").increment(1);
        }
    }

    /// Records one strategy run.
    pub fn record_strategy(&self, result: &StrategyResult) {
        let mut strategies = acquire_lock(&self.strategies);
        let counts = strategies.entry(result.strategy).or_default();
        counts.runs += 1;
        if result.success {
            counts.successes += 1;
        } else {
            counts.failures += 1;
        }
        counts.total_duration_ms = counts.total_duration_ms.saturating_add(result.duration_ms);
    }

    /// Records that the primary round failed.
    pub fn record_fallback_activation(&self) {
        self.fallback_activations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("fallback_activations_total").increment(1);
    }

    /// Records a finished consultation.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_consultation(&self, result: &AggregatedResult) {
        self.consultations.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(result.duration_ms, Ordering::Relaxed);
        if let Some(trace) = result.fallback.as_ref().filter(|_| !result.from_cache) {
            if trace.recovered_by.is_some() {
                self.fallback_recoveries.fetch_add(1, Ordering::Relaxed);
            } else {
                self.ultimate_fallbacks.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("ultimate_fallbacks_total").increment(1);
            }
        }

        let outcome = if result.from_cache {
            "cache"
        } else if result.success {
            "success"
        } else {
            "failure"
        };
        metrics::counter!("consultations_total", "outcome" => outcome).increment(1);
        metrics::histogram!("consultation_duration_ms").record(result.duration_ms as f64);
        metrics::gauge!("consultation_confidence").set(f64::from(result.confidence_score));
    }

    /// Copies the counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self, cache: CacheStats, bridge: BridgeStats) -> EngineMetricsSnapshot {
        let consultations = self.consultations.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        let average_latency_ms = if consultations == 0 {
            0.0
        } else {
            total_latency as f64 / consultations as f64
        };
        let strategies = acquire_lock(&self.strategies)
            .iter()
            .map(|(kind, counts)| (kind.as_str().to_string(), *counts))
            .collect();

        EngineMetricsSnapshot {
            consultations,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fallback_activations: self.fallback_activations.load(Ordering::Relaxed),
            fallback_recoveries: self.fallback_recoveries.load(Ordering::Relaxed),
            ultimate_fallbacks: self.ultimate_fallbacks.load(Ordering::Relaxed),
            average_latency_ms,
            strategies,
            cache,
            bridge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FallbackTrace;

    #[test]
    fn test_strategy_counts_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.record_strategy(&StrategyResult::success(
            StrategyKind::HybridSearch,
            serde_json::json!({}),
        ));
        metrics.record_strategy(
            &StrategyResult::failure(StrategyKind::HybridSearch, "boom").with_duration_ms(7),
        );

        let snapshot = metrics.snapshot(CacheStats::default(), BridgeStats::default());
        let counts = snapshot.strategies["hybrid_search"];
        assert_eq!(counts.runs, 2);
        assert_eq!(counts.successes, 1);
        assert_eq!(counts.failures, 1);
        assert_eq!(counts.total_duration_ms, 7);
    }

    #[test]
    fn test_consultation_outcomes() {
        let metrics = EngineMetrics::new();
        let mut ok = AggregatedResult::from_results(vec![StrategyResult::success(
            StrategyKind::MemoryRecall,
            serde_json::json!({}),
        )]);
        ok.duration_ms = 10;
        metrics.record_consultation(&ok);

        let mut failed = AggregatedResult::ultimate_fallback(
            vec![StrategyResult::failure(StrategyKind::MemoryRecall, "x")],
            FallbackTrace::default(),
            vec!["retry".to_string()],
        );
        failed.duration_ms = 30;
        metrics.record_consultation(&failed);
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);

        let snapshot = metrics.snapshot(CacheStats::default(), BridgeStats::default());
        assert_eq!(snapshot.consultations, 2);
        assert_eq!(snapshot.ultimate_fallbacks, 1);
        assert!((snapshot.average_latency_ms - 20.0).abs() < f64::EPSILON);
        assert!((snapshot.cache_hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}

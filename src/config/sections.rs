//! Per-component configuration sections.
//!
//! Every section deserializes from TOML with defaults for missing keys and
//! rejects unknown keys.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Cross-process bridge settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Command used to start the remote runtime (`program arg...`). None = disconnected.
    pub command: Option<Vec<String>>,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Initial backoff; doubles per retry.
    pub retry_backoff_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_backoff_ms: u64,
    /// Consecutive final failures before the breaker opens.
    pub breaker_failure_threshold: u32,
    /// How long an open breaker waits before allowing a half-open trial.
    pub breaker_cooldown_ms: u64,
    /// Capacity of the response LRU. 0 disables response caching.
    pub response_cache_size: usize,
    /// Lifetime of cached responses.
    pub response_cache_ttl_secs: u64,
    /// Latency above which a call is counted as slow.
    pub latency_slo_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_ms: 5_000,
            max_retries: 2,
            retry_backoff_ms: 100,
            max_backoff_ms: 2_000,
            breaker_failure_threshold: 3,
            breaker_cooldown_ms: 30_000,
            response_cache_size: 256,
            response_cache_ttl_secs: 300,
            latency_slo_ms: 2_000,
        }
    }
}

impl BridgeConfig {
    /// Per-attempt timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based), capped.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .retry_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Intelligent cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether consultation results are cached.
    pub enabled: bool,
    /// Maximum entries before eviction.
    pub capacity: usize,
    /// Base TTL before adaptive multipliers.
    pub base_ttl_secs: u64,
    /// Payloads above this size are compression candidates.
    pub compression_threshold_bytes: usize,
    /// Minimum fractional size reduction for compression to be kept.
    pub min_compression_savings: f64,
    /// Occupancy fraction eviction shrinks to.
    pub eviction_target_ratio: f64,
    /// Whether the pattern-indexed preload cache is used.
    pub preload_enabled: bool,
    /// Number of sorted significant words forming a preload pattern.
    pub preload_pattern_words: usize,
    /// Directory for persisted cache records. None = memory only.
    pub persist_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1_000,
            base_ttl_secs: 3_600,
            compression_threshold_bytes: 1_024,
            min_compression_savings: 0.2,
            eviction_target_ratio: 0.8,
            preload_enabled: true,
            preload_pattern_words: 3,
            persist_dir: None,
        }
    }
}

impl CacheConfig {
    /// Base TTL as a duration.
    #[must_use]
    pub const fn base_ttl(&self) -> Duration {
        Duration::from_secs(self.base_ttl_secs)
    }
}

/// Query router settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Maximum strategies selected (and run concurrently) per consultation.
    pub max_concurrency: usize,
    /// Upper bound for one strategy run.
    pub strategy_timeout_ms: u64,
    /// Queries longer than this are high complexity.
    pub long_query_chars: usize,
    /// Queries shorter than this are low complexity.
    pub short_query_chars: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            strategy_timeout_ms: 10_000,
            long_query_chars: 200,
            short_query_chars: 50,
        }
    }
}

impl RouterConfig {
    /// Strategy timeout as a duration.
    #[must_use]
    pub const fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }
}

/// Hybrid search settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HybridConfig {
    /// RRF k constant.
    pub k: f32,
    /// Weight of the vector list.
    pub vector_weight: f32,
    /// Weight of the keyword list.
    pub keyword_weight: f32,
    /// Candidates fetched from each source.
    pub candidate_limit: usize,
    /// Fused results returned.
    pub result_limit: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            k: 60.0,
            vector_weight: 0.7,
            keyword_weight: 0.3,
            candidate_limit: 20,
            result_limit: 10,
        }
    }
}

/// Contextual enrichment settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// Character budget for context + chunk.
    pub window_chars: usize,
    /// Number of shared terms listed by the extractive fallback.
    pub shared_terms: usize,
    /// Results returned by the enrichment strategy.
    pub result_limit: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            window_chars: 2_000,
            shared_terms: 8,
            result_limit: 5,
        }
    }
}

/// Agentic code analysis settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgenticConfig {
    /// Minimum characters for a candidate block.
    pub min_block_chars: usize,
    /// Maximum characters for a candidate block.
    pub max_block_chars: usize,
    /// Minimum confidence for a pattern match to be kept.
    pub pattern_threshold: f32,
    /// Maximum blocks analysed per run.
    pub max_blocks: usize,
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            min_block_chars: 300,
            max_block_chars: 5_000,
            pattern_threshold: 0.5,
            max_blocks: 20,
        }
    }
}

/// Reranking settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RerankConfig {
    /// Weight of the original score.
    pub original_weight: f32,
    /// Weight of the cross-encoder score.
    pub cross_encoder_weight: f32,
    /// Candidates below this blended score are dropped.
    pub min_score: f32,
    /// Boost added by the fallback scorer when the query occurs verbatim.
    pub exact_match_boost: f32,
    /// Target latency. Exceeding it is logged only.
    pub latency_budget_ms: u64,
    /// Candidates considered.
    pub candidate_limit: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            original_weight: 0.3,
            cross_encoder_weight: 0.7,
            min_score: 0.1,
            exact_match_boost: 0.2,
            latency_budget_ms: 200,
            candidate_limit: 20,
        }
    }
}

/// Extract–Cognify–Load settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Entities below this confidence are discarded.
    pub min_entity_confidence: f32,
    /// Maximum entities kept from one extraction.
    pub max_entities: usize,
    /// Relationships below this strength are discarded.
    pub relationship_threshold: f32,
    /// Maximum entity pairs Cognify will score.
    pub max_pairs: usize,
    /// Whether Load pushes to the remote knowledge graph.
    pub push_to_knowledge_graph: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_entity_confidence: 0.5,
            max_entities: 50,
            relationship_threshold: 0.4,
            max_pairs: 2_000,
            push_to_knowledge_graph: true,
        }
    }
}

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilitySettings {
    /// Filter directive, e.g. `memconsult=debug`.
    pub log_level: String,
    /// Output format.
    pub log_format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Install a Prometheus recorder.
    pub metrics_enabled: bool,
    /// Port for the Prometheus HTTP listener.
    pub metrics_port: u16,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "memconsult=info".to_string(),
            log_format: LogFormat::Pretty,
            log_file: None,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

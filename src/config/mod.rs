//! Configuration management.
//!
//! Configuration is read from TOML (explicit path or the platform config
//! directory), then environment overrides (`MEMCONSULT_*`) are applied, then
//! [`EngineConfig::validate`] enforces construction-time contracts.

mod features;
mod sections;

pub use features::{FeatureFlags, critical_paths_present};
pub use sections::{
    AgenticConfig, BridgeConfig, CacheConfig, EnrichmentConfig, HybridConfig, LogFormat,
    ObservabilitySettings, PipelineConfig, RerankConfig, RouterConfig,
};

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Data directory for the document store.
    pub data_dir: PathBuf,
    /// Use an in-memory document store instead of `data_dir`.
    pub in_memory: bool,
    /// Bridge settings.
    pub bridge: BridgeConfig,
    /// Cache settings.
    pub cache: CacheConfig,
    /// Router settings.
    pub router: RouterConfig,
    /// Hybrid search settings.
    pub hybrid: HybridConfig,
    /// Contextual enrichment settings.
    pub enrichment: EnrichmentConfig,
    /// Agentic analysis settings.
    pub agentic: AgenticConfig,
    /// Reranking settings.
    pub rerank: RerankConfig,
    /// ECL pipeline settings.
    pub pipeline: PipelineConfig,
    /// Strategy feature flags.
    pub features: FeatureFlags,
    /// Logging and metrics.
    pub observability: ObservabilitySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".memconsult"),
            in_memory: true,
            bridge: BridgeConfig::default(),
            cache: CacheConfig::default(),
            router: RouterConfig::default(),
            hybrid: HybridConfig::default(),
            enrichment: EnrichmentConfig::default(),
            agentic: AgenticConfig::default(),
            rerank: RerankConfig::default(),
            pipeline: PipelineConfig::default(),
            features: FeatureFlags::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown keys.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/memconsult/`. Returns
    /// defaults if no file is found or the file is unreadable.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("memconsult").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("memconsult")
                .join("config.toml"),
        ];

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<u64>("MEMCONSULT_BRIDGE_TIMEOUT_MS") {
            self.bridge.timeout_ms = v;
        }
        if let Some(v) = env_parse::<u32>("MEMCONSULT_BRIDGE_MAX_RETRIES") {
            self.bridge.max_retries = v;
        }
        if let Some(v) = env_parse::<u32>("MEMCONSULT_BRIDGE_BREAKER_THRESHOLD") {
            self.bridge.breaker_failure_threshold = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("MEMCONSULT_BRIDGE_BREAKER_COOLDOWN_MS") {
            self.bridge.breaker_cooldown_ms = v;
        }
        if let Ok(v) = std::env::var("MEMCONSULT_BRIDGE_COMMAND") {
            let parts: Vec<String> = v.split_whitespace().map(str::to_string).collect();
            self.bridge.command = (!parts.is_empty()).then_some(parts);
        }
        if let Some(v) = env_parse::<bool>("MEMCONSULT_CACHE_ENABLED") {
            self.cache.enabled = v;
        }
        if let Some(v) = env_parse::<usize>("MEMCONSULT_CACHE_CAPACITY") {
            self.cache.capacity = v;
        }
        if let Some(v) = env_parse::<u64>("MEMCONSULT_CACHE_TTL_SECS") {
            self.cache.base_ttl_secs = v;
        }
        if let Some(v) = env_parse::<usize>("MEMCONSULT_MAX_CONCURRENCY") {
            self.router.max_concurrency = v;
        }
        if let Ok(v) = std::env::var("MEMCONSULT_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
            self.in_memory = false;
        }
        if let Ok(v) = std::env::var("MEMCONSULT_LOG") {
            self.observability.log_level = v;
        }
        self
    }

    /// Sets the data directory and switches to an on-disk store.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self.in_memory = false;
        self
    }

    /// Validates construction-time contracts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first violated contract.
    pub fn validate(&self) -> Result<()> {
        let b = &self.bridge;
        ensure(b.timeout_ms > 0, "bridge.timeout_ms must be > 0")?;
        ensure(
            b.breaker_failure_threshold > 0,
            "bridge.breaker_failure_threshold must be > 0",
        )?;
        if let Some(command) = &b.command {
            ensure(!command.is_empty(), "bridge.command must name a program")?;
        }

        let c = &self.cache;
        ensure(c.capacity > 0, "cache.capacity must be > 0")?;
        ensure(c.base_ttl_secs > 0, "cache.base_ttl_secs must be > 0")?;
        ensure(
            (0.0..1.0).contains(&c.min_compression_savings),
            "cache.min_compression_savings must be in [0, 1)",
        )?;
        ensure(
            c.eviction_target_ratio > 0.0 && c.eviction_target_ratio <= 1.0,
            "cache.eviction_target_ratio must be in (0, 1]",
        )?;
        ensure(
            c.preload_pattern_words > 0,
            "cache.preload_pattern_words must be > 0",
        )?;

        let r = &self.router;
        ensure(r.max_concurrency > 0, "router.max_concurrency must be > 0")?;
        ensure(r.strategy_timeout_ms > 0, "router.strategy_timeout_ms must be > 0")?;
        ensure(
            r.short_query_chars <= r.long_query_chars,
            "router.short_query_chars must not exceed router.long_query_chars",
        )?;

        let h = &self.hybrid;
        ensure(h.k > 0.0, "hybrid.k must be > 0")?;
        ensure(unit(h.vector_weight), "hybrid.vector_weight must be in [0, 1]")?;
        ensure(unit(h.keyword_weight), "hybrid.keyword_weight must be in [0, 1]")?;
        ensure(h.result_limit > 0, "hybrid.result_limit must be > 0")?;

        ensure(
            self.enrichment.window_chars > 0,
            "enrichment.window_chars must be > 0",
        )?;

        let a = &self.agentic;
        ensure(
            a.min_block_chars <= a.max_block_chars,
            "agentic.min_block_chars must not exceed agentic.max_block_chars",
        )?;
        ensure(unit(a.pattern_threshold), "agentic.pattern_threshold must be in [0, 1]")?;

        let rr = &self.rerank;
        ensure(unit(rr.original_weight), "rerank.original_weight must be in [0, 1]")?;
        ensure(
            unit(rr.cross_encoder_weight),
            "rerank.cross_encoder_weight must be in [0, 1]",
        )?;
        ensure(unit(rr.min_score), "rerank.min_score must be in [0, 1]")?;

        let p = &self.pipeline;
        ensure(
            unit(p.min_entity_confidence),
            "pipeline.min_entity_confidence must be in [0, 1]",
        )?;
        ensure(
            unit(p.relationship_threshold),
            "pipeline.relationship_threshold must be in [0, 1]",
        )?;
        ensure(p.max_entities > 0, "pipeline.max_entities must be > 0")?;

        Ok(())
    }

    /// Stable fingerprint of the settings that change consultation output.
    ///
    /// Part of every cache key so a config change never serves stale shapes.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut enabled: Vec<&str> = self
            .features
            .enabled_strategies()
            .iter()
            .map(crate::models::StrategyKind::as_str)
            .collect();
        enabled.sort_unstable();
        format!(
            "v1|mc={}|k={}|vw={}|kw={}|hl={}|ow={}|cw={}|rm={}|ec={}|rt={}|pt={}|s={}",
            self.router.max_concurrency,
            self.hybrid.k,
            self.hybrid.vector_weight,
            self.hybrid.keyword_weight,
            self.hybrid.result_limit,
            self.rerank.original_weight,
            self.rerank.cross_encoder_weight,
            self.rerank.min_score,
            self.pipeline.min_entity_confidence,
            self.pipeline.relationship_threshold,
            self.agentic.pattern_threshold,
            enabled.join(","),
        )
    }
}

fn ensure(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidConfig(message.to_string()))
    }
}

fn unit(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategyKind;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = EngineConfig::default();
        config.cache.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("cache.capacity"));
    }

    #[test]
    fn test_weight_out_of_range_rejected() {
        let mut config = EngineConfig::default();
        config.hybrid.vector_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_block_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.agentic.min_block_chars = 6_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_sections() {
        let config = EngineConfig::from_toml(
            r#"
            in_memory = true

            [bridge]
            max_retries = 5
            command = ["python3", "bridge.py"]

            [router]
            max_concurrency = 3

            [features]
            disabled = ["reranking"]
            "#,
        )
        .unwrap();
        assert_eq!(config.bridge.max_retries, 5);
        assert_eq!(config.router.max_concurrency, 3);
        assert!(!config.features.is_enabled(StrategyKind::Reranking));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_rejects_unknown_section() {
        assert!(EngineConfig::from_toml("[telemetry]\nx = 1").is_err());
    }

    #[test]
    fn test_fingerprint_changes_with_weights() {
        let a = EngineConfig::default();
        let mut b = EngineConfig::default();
        b.hybrid.vector_weight = 0.5;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), EngineConfig::default().fingerprint());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\ncapacity = 42\n").unwrap();
        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.cache.capacity, 42);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let result = EngineConfig::load_from_file(Path::new("/nonexistent/memconsult.toml"));
        assert!(result.is_err());
    }
}

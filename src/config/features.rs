//! Strategy feature flags.
//!
//! A strategy runs only when it is not disabled and every critical path it
//! declares exists. The base strategy cannot be disabled so a fallback chain
//! is never empty.

use crate::models::StrategyKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Feature flags controlling which strategies may run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureFlags {
    /// Strategies switched off.
    pub disabled: Vec<StrategyKind>,
    /// Files that must exist for a strategy to be enabled.
    pub required_paths: BTreeMap<StrategyKind, Vec<PathBuf>>,
    /// Historical-corrections log searched by memory recall.
    pub corrections_log: Option<PathBuf>,
}

impl FeatureFlags {
    /// Creates flags with every strategy enabled.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Disables a strategy. Disabling the base strategy is ignored.
    #[must_use]
    pub fn disable(mut self, strategy: StrategyKind) -> Self {
        if strategy != StrategyKind::BASE && !self.disabled.contains(&strategy) {
            self.disabled.push(strategy);
        }
        self
    }

    /// Declares a critical path for a strategy.
    #[must_use]
    pub fn require_path(mut self, strategy: StrategyKind, path: impl Into<PathBuf>) -> Self {
        self.required_paths
            .entry(strategy)
            .or_default()
            .push(path.into());
        self
    }

    /// Returns whether a strategy may run.
    #[must_use]
    pub fn is_enabled(&self, strategy: StrategyKind) -> bool {
        if strategy == StrategyKind::BASE {
            return true;
        }
        if self.disabled.contains(&strategy) {
            return false;
        }
        self.required_paths
            .get(&strategy)
            .is_none_or(|paths| critical_paths_present(paths))
    }

    /// Returns the enabled strategies.
    #[must_use]
    pub fn enabled_strategies(&self) -> Vec<StrategyKind> {
        StrategyKind::all()
            .iter()
            .copied()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

/// Returns true when every path exists.
#[must_use]
pub fn critical_paths_present(paths: &[PathBuf]) -> bool {
    paths.iter().all(|path| {
        let present = path.exists();
        if !present {
            tracing::debug!(path = %path.display(), "critical path missing");
        }
        present
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_enabled_by_default() {
        let flags = FeatureFlags::all();
        assert_eq!(flags.enabled_strategies().len(), StrategyKind::all().len());
    }

    #[test]
    fn test_base_cannot_be_disabled() {
        let flags = FeatureFlags::all().disable(StrategyKind::BASE);
        assert!(flags.is_enabled(StrategyKind::BASE));
    }

    #[test]
    fn test_missing_required_path_disables() {
        let flags = FeatureFlags::all()
            .require_path(StrategyKind::AgenticAnalysis, "/definitely/not/here.toml");
        assert!(!flags.is_enabled(StrategyKind::AgenticAnalysis));
        assert!(flags.is_enabled(StrategyKind::HybridSearch));
    }

    #[test]
    fn test_present_required_path_enables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "x = 1").unwrap();
        let flags = FeatureFlags::all().require_path(StrategyKind::EclPipeline, &path);
        assert!(flags.is_enabled(StrategyKind::EclPipeline));
    }
}

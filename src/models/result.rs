//! Strategy and aggregated consultation results.
//!
//! Every result carries an explicit success flag. A failed strategy keeps its
//! error message; nothing is reported as a silent null.

use super::{RoutingDecision, StrategyKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one strategy execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    /// Strategy that produced this result.
    pub strategy: StrategyKind,
    /// Whether the strategy succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time.
    #[serde(default)]
    pub duration_ms: u64,
}

impl StrategyResult {
    /// Creates a successful result.
    #[must_use]
    pub const fn success(strategy: StrategyKind, data: serde_json::Value) -> Self {
        Self {
            strategy,
            success: true,
            data: Some(data),
            error: None,
            duration_ms: 0,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(strategy: StrategyKind, error: impl Into<String>) -> Self {
        Self {
            strategy,
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    /// Sets the measured duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Returns the strategy name.
    #[must_use]
    pub const fn strategy_name(&self) -> &'static str {
        self.strategy.as_str()
    }

    /// Number of result items this strategy contributed.
    ///
    /// Counts the `results` array when the payload has one, otherwise one
    /// item for any successful payload.
    #[must_use]
    pub fn item_count(&self) -> usize {
        if !self.success {
            return 0;
        }
        match &self.data {
            Some(data) => data
                .get("results")
                .and_then(serde_json::Value::as_array)
                .map_or(1, Vec::len),
            None => 0,
        }
    }
}

/// How the fallback chain was used, if at all.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FallbackTrace {
    /// Strategies attempted in fallback order.
    pub attempted: Vec<StrategyKind>,
    /// The strategy that recovered, if any.
    pub recovered_by: Option<StrategyKind>,
    /// Why the primary round was considered failed.
    pub reason: String,
}

/// Aggregated outcome of one consultation.
///
/// This is the only value external callers receive. Exhausting the whole
/// fallback chain produces `success == false`, `confidence_score == 0` and a
/// non-empty `suggestions` list; it is never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Whether at least one strategy produced data.
    pub success: bool,
    /// Strategies that succeeded, in execution order.
    pub successful_strategies: Vec<StrategyKind>,
    /// Strategies that failed, in execution order.
    pub failed_strategies: Vec<StrategyKind>,
    /// Per-strategy results keyed by strategy name, kept regardless of success.
    pub combined_data: BTreeMap<String, StrategyResult>,
    /// `successful / total` over every strategy attempted.
    pub confidence_score: f32,
    /// Total number of result items across successful strategies.
    pub result_count: usize,
    /// Fallback usage, when the primary round failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackTrace>,
    /// Suggestions for the caller when nothing answered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Whether this result was served from the cache.
    #[serde(default)]
    pub from_cache: bool,
    /// Routing decision that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
    /// Wall-clock consultation time.
    #[serde(default)]
    pub duration_ms: u64,
}

impl AggregatedResult {
    /// Aggregates strategy results.
    ///
    /// Order-independent for scoring: the confidence is a ratio of counts and
    /// per-strategy data is keyed by name.
    #[must_use]
    pub fn from_results(results: Vec<StrategyResult>) -> Self {
        let mut successful_strategies = Vec::new();
        let mut failed_strategies = Vec::new();
        let mut combined_data = BTreeMap::new();
        let mut result_count = 0;

        for result in results {
            if result.success {
                if !successful_strategies.contains(&result.strategy) {
                    successful_strategies.push(result.strategy);
                }
                result_count += result.item_count();
            } else if !failed_strategies.contains(&result.strategy) {
                failed_strategies.push(result.strategy);
            }
            combined_data.insert(result.strategy_name().to_string(), result);
        }

        // A strategy recovered during fallback is no longer a failure.
        failed_strategies.retain(|kind| !successful_strategies.contains(kind));

        let total = successful_strategies.len() + failed_strategies.len();
        let confidence_score = confidence(successful_strategies.len(), total);

        Self {
            success: !successful_strategies.is_empty(),
            successful_strategies,
            failed_strategies,
            combined_data,
            confidence_score,
            result_count,
            fallback: None,
            suggestions: Vec::new(),
            from_cache: false,
            routing: None,
            duration_ms: 0,
        }
    }

    /// Builds the terminal envelope returned when every fallback failed.
    #[must_use]
    pub fn ultimate_fallback(
        results: Vec<StrategyResult>,
        fallback: FallbackTrace,
        suggestions: Vec<String>,
    ) -> Self {
        let mut aggregated = Self::from_results(results);
        aggregated.success = false;
        aggregated.confidence_score = 0.0;
        aggregated.result_count = 0;
        aggregated.fallback = Some(fallback);
        aggregated.suggestions = suggestions;
        aggregated
    }

    /// Total strategies attempted.
    #[must_use]
    pub fn total_strategies(&self) -> usize {
        self.successful_strategies.len() + self.failed_strategies.len()
    }

    /// Returns the result for one strategy.
    #[must_use]
    pub fn strategy(&self, kind: StrategyKind) -> Option<&StrategyResult> {
        self.combined_data.get(kind.as_str())
    }
}

#[allow(clippy::cast_precision_loss)]
fn confidence(successes: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        successes as f32 / total as f32
    }
}

//! Query routing.
//!
//! [`QueryRouter::route`] turns a query into an immutable [`RoutingDecision`]:
//! classify ([`analyze`]), select strategies, order them by fixed priority and
//! derive the fallback chain.

mod analysis;

pub use analysis::{analyze, complexity};

use crate::config::{FeatureFlags, RouterConfig};
use crate::models::{
    Complexity, Context, Query, QueryAnalysis, QueryType, RoutingDecision, StrategyKind,
};

/// Classifies queries and selects strategies.
#[derive(Debug, Clone)]
pub struct QueryRouter {
    config: RouterConfig,
    features: FeatureFlags,
}

impl QueryRouter {
    /// Creates a router.
    #[must_use]
    pub const fn new(config: RouterConfig, features: FeatureFlags) -> Self {
        Self { config, features }
    }

    /// Classifies a query.
    #[must_use]
    pub fn analyze(&self, query: &Query, context: &Context) -> QueryAnalysis {
        analyze(query, context, &self.config)
    }

    /// Selects strategies for an analysis.
    ///
    /// The base strategy is always first. Hinted strategies follow the computed
    /// ones. Disabled strategies are dropped, duplicates removed and the list
    /// capped at `max_concurrency`, preserving insertion order.
    #[must_use]
    pub fn select_strategies(
        &self,
        analysis: &QueryAnalysis,
        hints: &[StrategyKind],
    ) -> Vec<StrategyKind> {
        let mut candidates = vec![StrategyKind::BASE];
        if analysis.requires_semantic_search {
            candidates.push(StrategyKind::HybridSearch);
        }
        if analysis.query_type == QueryType::MemoryQuery {
            candidates.push(StrategyKind::ContextualEnrichment);
        }
        if analysis.requires_code_analysis || analysis.complexity == Complexity::High {
            candidates.push(StrategyKind::AgenticAnalysis);
            candidates.push(StrategyKind::EclPipeline);
        }
        if analysis.requires_reranking {
            candidates.push(StrategyKind::Reranking);
        }
        candidates.extend_from_slice(hints);

        let mut selected = Vec::with_capacity(candidates.len());
        for strategy in candidates {
            if selected.len() >= self.config.max_concurrency {
                break;
            }
            if selected.contains(&strategy) {
                continue;
            }
            if !self.features.is_enabled(strategy) {
                tracing::debug!(strategy = %strategy, "strategy disabled, not selected");
                continue;
            }
            selected.push(strategy);
        }
        selected
    }

    /// Sorts strategies by ascending priority.
    #[must_use]
    pub fn order(strategies: &[StrategyKind]) -> Vec<StrategyKind> {
        let mut ordered = strategies.to_vec();
        ordered.sort_by_key(StrategyKind::priority);
        ordered
    }

    /// Fallback-capable strategies in input order, with the base strategy
    /// appended when absent. Never empty.
    #[must_use]
    pub fn fallback_chain(strategies: &[StrategyKind]) -> Vec<StrategyKind> {
        let mut chain: Vec<StrategyKind> = Vec::new();
        for strategy in strategies {
            if strategy.is_fallback_capable() && !chain.contains(strategy) {
                chain.push(*strategy);
            }
        }
        if !chain.contains(&StrategyKind::BASE) {
            chain.push(StrategyKind::BASE);
        }
        chain
    }

    /// Builds the routing decision for one consultation.
    #[must_use]
    pub fn route(&self, query: &Query, context: &Context) -> RoutingDecision {
        let analysis = self.analyze(query, context);
        let selected_strategies = self.select_strategies(&analysis, &context.hints);
        let execution_order = Self::order(&selected_strategies);
        let fallback_chain = Self::fallback_chain(&selected_strategies);

        tracing::debug!(
            query_type = %analysis.query_type,
            complexity = %analysis.complexity,
            strategies = ?execution_order,
            "routed query"
        );
        metrics::counter!(
            "routing_decisions_total",
            "query_type" => analysis.query_type.as_str()
        )
        .increment(1);

        RoutingDecision {
            selected_strategies,
            execution_order,
            fallback_chain,
            analysis,
        }
    }
}

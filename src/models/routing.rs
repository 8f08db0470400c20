//! Strategy identifiers and routing decisions.

use super::QueryAnalysis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of strategies the coordinator can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Base strategy: lexical recall over stored memories and collaborator inputs.
    MemoryRecall,
    /// Semantic + lexical search merged with weighted RRF.
    HybridSearch,
    /// Context-enriched embedding search.
    ContextualEnrichment,
    /// Cross-encoder reranking of candidates.
    Reranking,
    /// Code-block extraction and pattern analysis.
    AgenticAnalysis,
    /// Extract–Cognify–Load pipeline.
    EclPipeline,
}

impl StrategyKind {
    /// The strategy that is always selected and always closes a fallback chain.
    pub const BASE: Self = Self::MemoryRecall;

    /// Returns all strategies.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::MemoryRecall,
            Self::HybridSearch,
            Self::ContextualEnrichment,
            Self::Reranking,
            Self::AgenticAnalysis,
            Self::EclPipeline,
        ]
    }

    /// Returns the string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryRecall => "memory_recall",
            Self::HybridSearch => "hybrid_search",
            Self::ContextualEnrichment => "contextual_enrichment",
            Self::Reranking => "reranking",
            Self::AgenticAnalysis => "agentic_analysis",
            Self::EclPipeline => "ecl_pipeline",
        }
    }

    /// Parses a strategy name, accepting a few aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "memory_recall" | "recall" | "base" => Some(Self::MemoryRecall),
            "hybrid_search" | "hybrid" => Some(Self::HybridSearch),
            "contextual_enrichment" | "enrichment" | "semantic" => {
                Some(Self::ContextualEnrichment)
            },
            "reranking" | "rerank" => Some(Self::Reranking),
            "agentic_analysis" | "agentic" | "code_analysis" => Some(Self::AgenticAnalysis),
            "ecl_pipeline" | "ecl" | "cognify" => Some(Self::EclPipeline),
            _ => None,
        }
    }

    /// Fixed execution priority. Lower runs earlier.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::MemoryRecall => 1,
            Self::HybridSearch => 2,
            Self::ContextualEnrichment => 3,
            Self::Reranking => 4,
            Self::AgenticAnalysis => 5,
            Self::EclPipeline => 6,
        }
    }

    /// Whether the strategy may serve as a fallback after the primary round fails.
    #[must_use]
    pub const fn is_fallback_capable(&self) -> bool {
        matches!(
            self,
            Self::MemoryRecall | Self::HybridSearch | Self::ContextualEnrichment
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown strategy: {s}"))
    }
}

/// Routing decision for one consultation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected strategies in insertion order, unique.
    pub selected_strategies: Vec<StrategyKind>,
    /// Selected strategies sorted by priority.
    pub execution_order: Vec<StrategyKind>,
    /// Fallback-capable strategies; always contains the base strategy.
    pub fallback_chain: Vec<StrategyKind>,
    /// The analysis the decision was derived from.
    pub analysis: QueryAnalysis,
}

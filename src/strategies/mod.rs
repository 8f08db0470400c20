//! Strategy executors.
//!
//! One executor per [`StrategyKind`], all behind [`StrategyExecutor`]. The
//! [`StrategyRegistry`] is built once when the coordinator is constructed and
//! maps each kind to its executor.
//!
//! | Strategy | Inputs | Remote components |
//! |----------|--------|-------------------|
//! | `memory_recall` | BM25, corrections log, preferences | none |
//! | `hybrid_search` | vectors + BM25, weighted RRF | embedding |
//! | `contextual_enrichment` | query + surrounding document | summarizer, embedding |
//! | `reranking` | BM25/vector candidates | cross_encoder, embedding |
//! | `agentic_analysis` | code blocks | ast_parser, summarizer |
//! | `ecl_pipeline` | text | knowledge_graph |
//!
//! Executors never fail past [`StrategyExecutor::run`]: an `Err` from
//! [`StrategyExecutor::execute`] becomes a failed [`StrategyResult`].

mod agentic_analysis;
mod contextual_enrichment;
mod ecl;
mod hybrid_search;
mod memory_recall;
mod reranking;

pub use agentic_analysis::{AgenticAnalysisStrategy, CodeBlock, extract_code_blocks};
pub use contextual_enrichment::{ContextualEnrichmentStrategy, EnrichedChunk, compose_window, enrich};
pub use ecl::EclPipelineStrategy;
pub use hybrid_search::HybridSearchStrategy;
pub use memory_recall::MemoryRecallStrategy;
pub use reranking::RerankingStrategy;

use crate::bridge::Bridge;
use crate::config::EngineConfig;
use crate::models::{Context, Query, StrategyKind, StrategyResult};
use crate::storage::{CorrectionsLog, DocumentStore, KnowledgeGraphStore, PreferenceRecord};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// A retrieval or analysis strategy.
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    /// The strategy this executor implements.
    fn kind(&self) -> StrategyKind;

    /// Runs the strategy and returns its payload.
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy cannot produce a payload.
    async fn execute(&self, query: &Query, context: &Context) -> Result<Value>;

    /// Runs the strategy, capturing any error into the result.
    async fn run(&self, query: &Query, context: &Context) -> StrategyResult {
        let kind = self.kind();
        let start = Instant::now();
        let outcome = self.execute(query, context).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(data) => StrategyResult::success(kind, data),
            Err(e) => {
                tracing::warn!(strategy = %kind, error = %e, "strategy failed");
                StrategyResult::failure(kind, e.to_string())
            },
        };
        let status = if result.success { "success" } else { "failure" };
        metrics::counter!("strategy_runs_total", "strategy" => kind.as_str(), "status" => status)
            .increment(1);
        result.with_duration_ms(duration_ms)
    }
}

/// Shared collaborators handed to every executor.
#[derive(Debug, Clone)]
pub struct StrategyDeps {
    /// Engine settings.
    pub config: Arc<EngineConfig>,
    /// Stored memories.
    pub documents: Arc<DocumentStore>,
    /// Local knowledge graph.
    pub graph: Arc<KnowledgeGraphStore>,
    /// Cross-process bridge.
    pub bridge: Arc<Bridge>,
    /// Historical corrections, if configured.
    pub corrections: Option<CorrectionsLog>,
    /// Structured preferences.
    pub preferences: Arc<[PreferenceRecord]>,
}

/// Executors keyed by strategy.
pub struct StrategyRegistry {
    executors: BTreeMap<StrategyKind, Arc<dyn StrategyExecutor>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.kinds())
            .finish()
    }
}

impl StrategyRegistry {
    /// Builds an executor for every strategy.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        let executors: [Arc<dyn StrategyExecutor>; 6] = [
            Arc::new(MemoryRecallStrategy::new(deps)),
            Arc::new(HybridSearchStrategy::new(deps)),
            Arc::new(ContextualEnrichmentStrategy::new(deps)),
            Arc::new(RerankingStrategy::new(deps)),
            Arc::new(AgenticAnalysisStrategy::new(deps)),
            Arc::new(EclPipelineStrategy::new(deps)),
        ];
        Self {
            executors: executors
                .into_iter()
                .map(|executor| (executor.kind(), executor))
                .collect(),
        }
    }

    /// Registers or replaces an executor.
    pub fn register(&mut self, executor: Arc<dyn StrategyExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    /// Returns the executor for a strategy.
    #[must_use]
    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn StrategyExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// Registered strategies in priority order.
    #[must_use]
    pub fn kinds(&self) -> Vec<StrategyKind> {
        let mut kinds: Vec<StrategyKind> = self.executors.keys().copied().collect();
        kinds.sort_by_key(StrategyKind::priority);
        kinds
    }
}

/// Canonical query text, rejecting empty queries.
pub(crate) fn query_text(query: &Query) -> Result<String> {
    let text = query.canonical_text();
    if text.is_empty() {
        return Err(Error::InvalidInput("query text is empty".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::models::Document;

    pub fn deps() -> StrategyDeps {
        StrategyDeps {
            config: Arc::new(EngineConfig::default()),
            documents: Arc::new(DocumentStore::in_memory().unwrap()),
            graph: Arc::new(KnowledgeGraphStore::in_memory().unwrap()),
            bridge: Arc::new(Bridge::disconnected(BridgeConfig::default())),
            corrections: None,
            preferences: Arc::from(Vec::new()),
        }
    }

    pub async fn seed(deps: &StrategyDeps, docs: &[(&str, &str)]) {
        let embedder = crate::embedding::BridgeEmbedder::new(Arc::clone(&deps.bridge));
        for (id, content) in docs {
            let vector = embedder.embed(content).await.unwrap();
            deps.documents
                .upsert(&Document::new(*content).with_id(*id), Some(&vector))
                .unwrap();
        }
    }
}

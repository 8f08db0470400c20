//! Consultation coordinator.
//!
//! The [`Coordinator`] owns every piece of process-wide state: the result
//! cache, the bridge (and with it the breaker table and response cache), the
//! stores, the strategy registry and the metrics. Nothing is global; dropping
//! the coordinator drops all of it.
//!
//! A consultation runs:
//!
//! ```text
//! cache hit? ──yes──> cached result
//!     │ no
//! route ──> run selected strategies concurrently (timeout + panic capture)
//!     │
//! aggregate ── confidence > 0 ──> cache, return
//!     │ confidence == 0
//! fallback chain, one strategy at a time ── first success ──> return
//!     │ none
//! ultimate fallback {success: false, suggestions}
//! ```
//!
//! [`Coordinator::consult`] never returns an error. The only fallible public
//! entry point is [`Coordinator::new`], which rejects invalid configuration.

mod metrics;

pub use metrics::{EngineMetrics, EngineMetricsSnapshot, StrategyCounts};

use crate::bridge::Bridge;
use crate::cache::{CacheKey, CacheStats, IntelligentCache};
use crate::config::EngineConfig;
use crate::embedding::BridgeEmbedder;
use crate::models::{
    AggregatedResult, Context, Document, Entity, FallbackTrace, Query, QueryAnalysis, QueryType,
    Relationship, RoutingDecision, StrategyKind, StrategyResult,
};
use crate::pipeline::{EclPipeline, PipelineReport};
use crate::router::QueryRouter;
use crate::storage::{
    CorrectionsLog, DocumentStore, GraphStats, KnowledgeGraphStore, PreferenceRecord,
};
use crate::strategies::{
    MemoryRecallStrategy, StrategyDeps, StrategyExecutor, StrategyRegistry, enrich,
};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

const DOCUMENTS_DB: &str = "documents.db";
const GRAPH_DB: &str = "graph.db";
const MAX_ERROR_SUGGESTIONS: usize = 3;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Stored document id.
    pub id: String,
    /// Embedding dimensions.
    pub dimensions: usize,
    /// Generated context.
    pub context: String,
    /// Whether the context was shortened to fit the window.
    pub context_truncated: bool,
    /// Where the context came from.
    pub context_origin: &'static str,
}

/// Orchestrates routing, strategy execution, aggregation, caching and fallback.
pub struct Coordinator {
    config: Arc<EngineConfig>,
    fingerprint: String,
    router: QueryRouter,
    cache: IntelligentCache,
    bridge: Arc<Bridge>,
    deps: StrategyDeps,
    registry: StrategyRegistry,
    /// Strategies whose executor came from [`Coordinator::with_executor`].
    overridden: Vec<StrategyKind>,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("fingerprint", &self.fingerprint)
            .field("bridge", &self.bridge)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates a coordinator, building the bridge from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid, or an
    /// error if a store cannot be opened.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let bridge = Bridge::from_config(&config.bridge)?;
        Self::with_bridge(config, bridge)
    }

    /// Creates a coordinator over an existing bridge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid, or an
    /// error if a store cannot be opened.
    pub fn with_bridge(config: EngineConfig, bridge: Bridge) -> Result<Self> {
        config.validate()?;

        let (documents, graph) = if config.in_memory {
            (DocumentStore::in_memory()?, KnowledgeGraphStore::in_memory()?)
        } else {
            (
                DocumentStore::new(config.data_dir.join(DOCUMENTS_DB))?,
                KnowledgeGraphStore::new(config.data_dir.join(GRAPH_DB))?,
            )
        };

        let config = Arc::new(config);
        let bridge = Arc::new(bridge);
        let deps = StrategyDeps {
            config: Arc::clone(&config),
            documents: Arc::new(documents),
            graph: Arc::new(graph),
            bridge: Arc::clone(&bridge),
            corrections: config.features.corrections_log.clone().map(CorrectionsLog::new),
            preferences: Arc::from(Vec::new()),
        };
        let registry = StrategyRegistry::new(&deps);

        tracing::info!(
            in_memory = config.in_memory,
            connected = bridge.is_connected(),
            strategies = ?config.features.enabled_strategies(),
            "coordinator ready"
        );

        Ok(Self {
            fingerprint: config.fingerprint(),
            router: QueryRouter::new(config.router.clone(), config.features.clone()),
            cache: IntelligentCache::new(&config.cache),
            config,
            bridge,
            deps,
            registry,
            overridden: Vec::new(),
            metrics: EngineMetrics::new(),
        })
    }

    /// Supplies the external preference list used by memory recall.
    ///
    /// A memory recall executor installed with [`Coordinator::with_executor`]
    /// is kept, whichever builder runs first.
    #[must_use]
    pub fn with_preferences(mut self, preferences: Vec<PreferenceRecord>) -> Self {
        self.deps.preferences = Arc::from(preferences);
        if !self.overridden.contains(&StrategyKind::MemoryRecall) {
            self.registry
                .register(Arc::new(MemoryRecallStrategy::new(&self.deps)));
        }
        self
    }

    /// Replaces the executor for one strategy.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn StrategyExecutor>) -> Self {
        let kind = executor.kind();
        if !self.overridden.contains(&kind) {
            self.overridden.push(kind);
        }
        self.registry.register(executor);
        self
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The bridge.
    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Routes a query without running anything.
    #[must_use]
    pub fn route(&self, query: &Query, context: &Context) -> RoutingDecision {
        self.router.route(query, context)
    }

    /// Answers a query.
    ///
    /// Never fails: operational failures surface as a result with
    /// `success == false` and suggestions.
    pub async fn consult(&self, query: impl Into<Query>, context: &Context) -> AggregatedResult {
        let query = query.into();
        let span = tracing::info_span!(
            "consult",
            query_length = query.text().len(),
            source = context.source_label()
        );
        async {
            let start = Instant::now();
            let mut result = self.consult_inner(&query, context).await;
            result.duration_ms = elapsed_ms(start);
            self.metrics.record_consultation(&result);
            tracing::info!(
                success = result.success,
                confidence = result.confidence_score,
                results = result.result_count,
                from_cache = result.from_cache,
                duration_ms = result.duration_ms,
                "consultation finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn consult_inner(&self, query: &Query, context: &Context) -> AggregatedResult {
        if query.is_empty() {
            return AggregatedResult::ultimate_fallback(
                Vec::new(),
                FallbackTrace {
                    reason: "empty query".to_string(),
                    ..FallbackTrace::default()
                },
                vec!["Provide a non-empty query.".to_string()],
            );
        }

        let key = CacheKey::new(
            query,
            context,
            &self.fingerprint,
            self.config.cache.preload_pattern_words,
        );
        if let Some(cached) = self.cached(&key) {
            return cached;
        }

        let decision = self.router.route(query, context);
        let primary = self
            .execute_round(&decision.execution_order, query, context)
            .await;
        let aggregated = AggregatedResult::from_results(primary.clone());

        let mut result = if aggregated.confidence_score > 0.0 {
            aggregated
        } else {
            self.metrics.record_fallback_activation();
            self.run_fallback_chain(&decision, primary, query, context)
                .await
        };
        result.routing = Some(decision);

        if result.success {
            match serde_json::to_value(&result) {
                Ok(value) => self.cache.put(&key, &value),
                Err(e) => tracing::warn!(error = %e, "result not cacheable"),
            }
        }
        result
    }

    fn cached(&self, key: &CacheKey) -> Option<AggregatedResult> {
        let Some(value) = self.cache.get(key) else {
            self.metrics.record_cache_lookup(false);
            return None;
        };
        match serde_json::from_value::<AggregatedResult>(value) {
            Ok(mut cached) => {
                self.metrics.record_cache_lookup(true);
                cached.from_cache = true;
                Some(cached)
            },
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "discarding unreadable cache entry");
                self.cache.invalidate(key);
                self.metrics.record_cache_lookup(false);
                None
            },
        }
    }

    /// Runs strategies concurrently and collects every result.
    async fn execute_round(
        &self,
        order: &[StrategyKind],
        query: &Query,
        context: &Context,
    ) -> Vec<StrategyResult> {
        let runs = order.iter().map(|kind| self.run_strategy(*kind, query, context));
        futures::future::join_all(runs).await
    }

    /// Runs the fallback chain one strategy at a time, stopping at the first
    /// success.
    async fn run_fallback_chain(
        &self,
        decision: &RoutingDecision,
        mut results: Vec<StrategyResult>,
        query: &Query,
        context: &Context,
    ) -> AggregatedResult {
        let reason = format!(
            "primary round failed: {}",
            first_errors(&results).join("; ")
        );
        tracing::warn!(
            chain = ?decision.fallback_chain,
            reason = %reason,
            "running fallback chain"
        );

        let mut attempted = Vec::new();
        for kind in &decision.fallback_chain {
            attempted.push(*kind);
            let result = self.run_strategy(*kind, query, context).await;
            let recovered = result.success;
            results.retain(|r| r.strategy != *kind);
            results.push(result);
            if recovered {
                tracing::info!(strategy = %kind, "fallback recovered");
                let mut aggregated = AggregatedResult::from_results(results);
                aggregated.fallback = Some(FallbackTrace {
                    attempted,
                    recovered_by: Some(*kind),
                    reason,
                });
                return aggregated;
            }
        }

        tracing::error!(attempted = ?attempted, "fallback chain exhausted");
        let suggestions = self.suggestions(&decision.analysis, &results);
        AggregatedResult::ultimate_fallback(
            results,
            FallbackTrace {
                attempted,
                recovered_by: None,
                reason,
            },
            suggestions,
        )
    }

    /// Runs one strategy in its own task, bounded by the strategy timeout.
    async fn run_strategy(
        &self,
        kind: StrategyKind,
        query: &Query,
        context: &Context,
    ) -> StrategyResult {
        let result = match self.registry.get(kind) {
            Some(executor) => {
                run_guarded(
                    executor,
                    query.clone(),
                    context.clone(),
                    self.config.router.strategy_timeout(),
                )
                .await
            },
            None => StrategyResult::failure(kind, "no executor registered"),
        };
        self.metrics.record_strategy(&result);
        result
    }

    fn suggestions(&self, analysis: &QueryAnalysis, results: &[StrategyResult]) -> Vec<String> {
        let mut suggestions =
            vec!["Rephrase the query with more specific terms.".to_string()];
        if matches!(
            analysis.query_type,
            QueryType::CodeAnalysis | QueryType::ErrorAnalysis
        ) {
            suggestions.push(
                "Attach the relevant code or stack trace to the context.".to_string(),
            );
        }
        if !self.bridge.is_connected() {
            suggestions.push(
                "Configure bridge.command so remote models are available.".to_string(),
            );
        }
        if self.deps.documents.count().is_ok_and(|count| count == 0) {
            suggestions.push("Ingest documents so recall and search have a corpus.".to_string());
        }
        suggestions.extend(
            first_errors(results)
                .into_iter()
                .take(MAX_ERROR_SUGGESTIONS)
                .map(|error| format!("Check {error}.")),
        );
        suggestions
    }

    /// Enriches, embeds and stores a document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank document, or an error if
    /// enrichment, embedding or storage fails.
    pub async fn ingest(&self, document: Document) -> Result<IngestReport> {
        let surrounding = document.content.clone();
        self.ingest_chunk(document, &surrounding).await
    }

    /// Ingests a chunk, generating its context from `surrounding`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank chunk, or an error if
    /// enrichment, embedding or storage fails.
    pub async fn ingest_chunk(&self, document: Document, surrounding: &str) -> Result<IngestReport> {
        if document.content.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "document '{}' has no content",
                document.id
            )));
        }
        let enriched = enrich(
            &self.bridge,
            &document.content,
            surrounding,
            &self.config.enrichment,
        )
        .await?;
        let embedding = BridgeEmbedder::new(Arc::clone(&self.bridge))
            .embed(&enriched.text)
            .await?;
        self.deps.documents.upsert(&document, Some(&embedding))?;

        // Cached results predate this document, on disk as well.
        self.cache.clear();
        tracing::debug!(id = %document.id, dimensions = embedding.len(), "document ingested");

        Ok(IngestReport {
            id: document.id,
            dimensions: embedding.len(),
            context: enriched.context,
            context_truncated: enriched.context_truncated,
            context_origin: enriched.origin,
        })
    }

    /// Runs Extract–Cognify–Load over `content` and persists the graph.
    pub async fn run_pipeline(&self, content: &str, source: &str) -> PipelineReport {
        EclPipeline::new(
            self.config.pipeline.clone(),
            Arc::clone(&self.deps.graph),
            Arc::clone(&self.bridge),
        )
        .run(content, source)
        .await
    }

    /// Stored documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn document_count(&self) -> Result<usize> {
        self.deps.documents.count()
    }

    /// Knowledge graph counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn graph_stats(&self) -> Result<GraphStats> {
        self.deps.graph.stats()
    }

    /// Loaded entities, highest confidence first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn entities(&self, limit: usize) -> Result<Vec<Entity>> {
        self.deps.graph.entities(limit)
    }

    /// Loaded relationships, strongest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn relationships(&self, limit: usize) -> Result<Vec<Relationship>> {
        self.deps.graph.relationships(limit)
    }

    /// Result cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Current metrics.
    #[must_use]
    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.metrics
            .snapshot(self.cache.stats(), self.bridge.stats())
    }

    /// Logs a final metrics snapshot and clears in-memory caches.
    pub fn shutdown(&self) {
        let snapshot = self.metrics();
        tracing::info!(
            consultations = snapshot.consultations,
            cache_hit_rate = snapshot.cache_hit_rate(),
            fallback_activations = snapshot.fallback_activations,
            ultimate_fallbacks = snapshot.ultimate_fallbacks,
            average_latency_ms = snapshot.average_latency_ms,
            "coordinator shutting down"
        );
        self.cache.clear_memory();
        self.bridge.clear_cache();
    }
}

/// Runs an executor in a spawned task so a panic or overrun becomes a failed
/// result instead of taking the consultation down.
async fn run_guarded(
    executor: Arc<dyn StrategyExecutor>,
    query: Query,
    context: Context,
    timeout: Duration,
) -> StrategyResult {
    let kind = executor.kind();
    let start = Instant::now();
    let handle = tokio::spawn(async move { executor.run(&query, &context).await });
    let abort = handle.abort_handle();

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            let cause = if join_error.is_panic() {
                "strategy panicked"
            } else {
                "strategy task cancelled"
            };
            tracing::error!(strategy = %kind, cause, "strategy task failed");
            StrategyResult::failure(kind, cause).with_duration_ms(elapsed_ms(start))
        },
        Err(_) => {
            abort.abort();
            tracing::warn!(
                strategy = %kind,
                timeout_ms = timeout.as_millis(),
                "strategy timed out"
            );
            ::metrics::counter!("strategy_timeouts_total", "strategy" => kind.as_str())
                .increment(1);
            StrategyResult::failure(
                kind,
                format!("timed out after {}ms", timeout.as_millis()),
            )
            .with_duration_ms(elapsed_ms(start))
        },
    }
}

fn first_errors(results: &[StrategyResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(|r| {
            r.error
                .as_ref()
                .map(|error| format!("{}: {error}", r.strategy))
        })
        .collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

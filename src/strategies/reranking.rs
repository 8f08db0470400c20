//! Cross-encoder reranking of retrieved candidates.

use super::{StrategyDeps, StrategyExecutor, query_text};
use crate::bridge::{Bridge, components};
use crate::config::RerankConfig;
use crate::embedding::BridgeEmbedder;
use crate::models::{Context, Query, SearchHit, StrategyKind};
use crate::scoring::{RerankWeights, rerank};
use crate::storage::DocumentStore;
use crate::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reranks lexical candidates (vector candidates when nothing matches
/// lexically) with `original * 0.3 + cross_encoder * 0.7`.
pub struct RerankingStrategy {
    config: RerankConfig,
    documents: Arc<DocumentStore>,
    bridge: Arc<Bridge>,
    embedder: BridgeEmbedder,
}

impl RerankingStrategy {
    /// Creates the executor.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        Self {
            config: deps.config.rerank.clone(),
            documents: Arc::clone(&deps.documents),
            bridge: Arc::clone(&deps.bridge),
            embedder: BridgeEmbedder::new(Arc::clone(&deps.bridge)),
        }
    }

    const fn weights(&self) -> RerankWeights {
        RerankWeights {
            original: self.config.original_weight,
            cross_encoder: self.config.cross_encoder_weight,
            min_score: self.config.min_score,
        }
    }

    async fn candidates(&self, text: &str) -> Result<Vec<SearchHit>> {
        let hits = self
            .documents
            .keyword_search(text, self.config.candidate_limit)?;
        if !hits.is_empty() {
            return Ok(hits);
        }
        let embedding = self.embedder.embed(text).await?;
        self.documents
            .vector_search(&embedding, self.config.candidate_limit)
    }

    /// Cross-encoder scores for each candidate, plus the scorer's origin.
    async fn cross_scores(
        &self,
        text: &str,
        candidates: &[SearchHit],
    ) -> Result<(Vec<f32>, &'static str)> {
        let texts: Vec<&str> = candidates.iter().map(|hit| hit.content.as_str()).collect();
        let reply = self
            .bridge
            .invoke(
                components::CROSS_ENCODER,
                components::SCORE,
                vec![json!(text), json!(texts), json!(self.config.exact_match_boost)],
            )
            .await?;
        #[allow(clippy::cast_possible_truncation)]
        let scores: Vec<f32> = reply
            .result
            .get("scores")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect()
            })
            .unwrap_or_default();
        if scores.len() != candidates.len() {
            tracing::warn!(
                expected = candidates.len(),
                received = scores.len(),
                "cross-encoder score count mismatch, missing scores count as zero"
            );
        }
        Ok((scores, reply.origin.as_str()))
    }
}

#[async_trait]
impl StrategyExecutor for RerankingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Reranking
    }

    async fn execute(&self, query: &Query, _context: &Context) -> Result<Value> {
        let start = Instant::now();
        let text = query_text(query)?;
        let candidates = self.candidates(&text).await?;
        if candidates.is_empty() {
            return Ok(json!({ "results": [], "candidates": 0 }));
        }

        let (scores, scorer) = self.cross_scores(&text, &candidates).await?;
        let reranked = rerank(&candidates, &scores, &self.weights());

        let elapsed = start.elapsed();
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let within_budget = elapsed <= Duration::from_millis(self.config.latency_budget_ms);
        if !within_budget {
            tracing::warn!(
                latency_ms,
                budget_ms = self.config.latency_budget_ms,
                "reranking exceeded its latency budget"
            );
            metrics::counter!("rerank_latency_budget_exceeded_total").increment(1);
        }

        Ok(json!({
            "results": reranked,
            "candidates": candidates.len(),
            "dropped": candidates.len() - reranked.len(),
            "scorer": scorer,
            "latency_ms": latency_ms,
            "within_budget": within_budget,
        }))
    }
}

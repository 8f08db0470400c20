//! Hybrid search: vector and BM25 lists merged with weighted RRF.

use super::{StrategyDeps, StrategyExecutor, query_text};
use crate::Result;
use crate::config::HybridConfig;
use crate::embedding::BridgeEmbedder;
use crate::models::{Context, Query, RankSource, StrategyKind};
use crate::scoring::{RankedList, weighted_rrf};
use crate::storage::DocumentStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Runs semantic and lexical search independently and fuses the rankings.
pub struct HybridSearchStrategy {
    config: HybridConfig,
    documents: Arc<DocumentStore>,
    embedder: BridgeEmbedder,
}

impl HybridSearchStrategy {
    /// Creates the executor.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        Self {
            config: deps.config.hybrid.clone(),
            documents: Arc::clone(&deps.documents),
            embedder: BridgeEmbedder::new(Arc::clone(&deps.bridge)),
        }
    }
}

#[async_trait]
impl StrategyExecutor for HybridSearchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HybridSearch
    }

    async fn execute(&self, query: &Query, _context: &Context) -> Result<Value> {
        let text = query_text(query)?;
        let embedding = self.embedder.embed(&text).await?;

        let vector_hits = self
            .documents
            .vector_search(&embedding, self.config.candidate_limit)?;
        let keyword_hits = self
            .documents
            .keyword_search(&text, self.config.candidate_limit)?;

        let fused = weighted_rrf(
            &[
                RankedList::new(RankSource::Vector, self.config.vector_weight, &vector_hits),
                RankedList::new(RankSource::Keyword, self.config.keyword_weight, &keyword_hits),
            ],
            self.config.k,
            self.config.result_limit,
        );
        let boosted = fused.iter().filter(|hit| hit.boosted).count();
        tracing::debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            fused = fused.len(),
            boosted,
            "hybrid search fused"
        );

        Ok(json!({
            "results": fused,
            "vector_candidates": vector_hits.len(),
            "keyword_candidates": keyword_hits.len(),
            "boosted": boosted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support;

    #[tokio::test]
    async fn test_document_in_both_lists_is_boosted() {
        let deps = test_support::deps();
        test_support::seed(
            &deps,
            &[
                ("auth", "token refresh fails when the session cache expires"),
                ("ui", "button colours follow the design system palette"),
            ],
        )
        .await;

        let result = HybridSearchStrategy::new(&deps)
            .run(&Query::from("session token refresh"), &Context::default())
            .await;
        assert!(result.success, "{:?}", result.error);
        let data = result.data.unwrap();
        let top = &data["results"][0];
        assert_eq!(top["hit"]["id"], "auth");
        assert_eq!(top["boosted"], true);
        assert_eq!(top["provenance"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_query_fails() {
        let result = HybridSearchStrategy::new(&test_support::deps())
            .run(&Query::from(""), &Context::default())
            .await;
        assert!(!result.success);
    }
}

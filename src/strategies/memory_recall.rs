//! Base strategy: lexical recall over stored memories and collaborator inputs.

use super::{StrategyDeps, StrategyExecutor, query_text};
use crate::Result;
use crate::models::{Context, Query, StrategyKind};
use crate::scoring::significant_terms;
use crate::storage::{CorrectionsLog, DocumentStore, PreferenceRecord, matching_preferences};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const RECALL_LIMIT: usize = 10;
const CORRECTION_LIMIT: usize = 5;
const MAX_TERMS: usize = 12;

/// BM25 recall plus corrections-log and preference matches.
///
/// Always succeeds for a non-empty query, even against an empty store, so it
/// can close every fallback chain.
pub struct MemoryRecallStrategy {
    documents: Arc<DocumentStore>,
    corrections: Option<CorrectionsLog>,
    preferences: Arc<[PreferenceRecord]>,
}

impl MemoryRecallStrategy {
    /// Creates the executor.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        Self {
            documents: Arc::clone(&deps.documents),
            corrections: deps.corrections.clone(),
            preferences: Arc::clone(&deps.preferences),
        }
    }
}

#[async_trait]
impl StrategyExecutor for MemoryRecallStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MemoryRecall
    }

    async fn execute(&self, query: &Query, _context: &Context) -> Result<Value> {
        let text = query_text(query)?;
        let terms: Vec<String> = significant_terms(&text)
            .into_iter()
            .take(MAX_TERMS)
            .map(|(term, _)| term)
            .collect();

        let hits = self.documents.keyword_search(&text, RECALL_LIMIT)?;

        // An unreadable log degrades recall instead of failing the base strategy.
        let corrections = match &self.corrections {
            Some(log) => log.search(&terms, CORRECTION_LIMIT).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "corrections log search failed");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let preferences = matching_preferences(&self.preferences, &terms);

        Ok(json!({
            "results": hits,
            "corrections": corrections,
            "preferences": preferences,
            "terms": terms,
        }))
    }
}

//! Contextual enrichment: situate a chunk within its document before embedding.

use super::{StrategyDeps, StrategyExecutor, query_text};
use crate::bridge::{Bridge, ReplyOrigin, components};
use crate::config::EnrichmentConfig;
use crate::embedding::BridgeEmbedder;
use crate::models::{Context, Query, StrategyKind};
use crate::storage::DocumentStore;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

const SEPARATOR: &str = "\n\n";

/// A chunk with its generated context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedChunk {
    /// Context as generated, before any truncation.
    pub context: String,
    /// Text to embed: context (possibly truncated) followed by the chunk.
    pub text: String,
    /// Whether the context was shortened to fit the window.
    pub context_truncated: bool,
    /// Origin of the context (`remote`, `cache` or `fallback`).
    pub origin: &'static str,
}

/// Joins `context` and `content` within `window_chars` characters.
///
/// Only the context is ever shortened. When the content alone fills the
/// window it is returned whole. Returns the text and whether the context was
/// cut.
#[must_use]
pub fn compose_window(context: &str, content: &str, window_chars: usize) -> (String, bool) {
    let context = context.trim();
    if context.is_empty() {
        return (content.to_string(), false);
    }
    let fixed = content.chars().count() + SEPARATOR.chars().count();
    let budget = window_chars.saturating_sub(fixed);
    let context_chars = context.chars().count();
    if budget == 0 {
        return (content.to_string(), true);
    }
    if context_chars <= budget {
        return (format!("{context}{SEPARATOR}{content}"), false);
    }
    let cut: String = context.chars().take(budget).collect();
    (format!("{}{SEPARATOR}{content}", cut.trim_end()), true)
}

/// Generates context for `chunk` from `document` and composes the window.
///
/// # Errors
///
/// Returns an error when the summarizer and all its fallbacks are unavailable.
pub async fn enrich(
    bridge: &Bridge,
    chunk: &str,
    document: &str,
    config: &EnrichmentConfig,
) -> Result<EnrichedChunk> {
    let reply = bridge
        .invoke(
            components::SUMMARIZER,
            components::CONTEXTUALIZE,
            vec![json!(chunk), json!(document), json!(config.shared_terms)],
        )
        .await?;
    let context = reply
        .result
        .get("context")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::MalformedEnvelope("contextualize reply has no 'context' string".to_string())
        })?
        .to_string();
    let (text, context_truncated) = compose_window(&context, chunk, config.window_chars);
    Ok(EnrichedChunk {
        context,
        text,
        context_truncated,
        origin: reply.origin.as_str(),
    })
}

/// Enriches the query with context from its surrounding document, then runs a
/// vector search with the enriched text.
///
/// The surrounding document is the context's `document` field, or the top
/// lexical matches when none is attached.
pub struct ContextualEnrichmentStrategy {
    config: EnrichmentConfig,
    documents: Arc<DocumentStore>,
    bridge: Arc<Bridge>,
    embedder: BridgeEmbedder,
}

impl ContextualEnrichmentStrategy {
    /// Creates the executor.
    #[must_use]
    pub fn new(deps: &StrategyDeps) -> Self {
        Self {
            config: deps.config.enrichment.clone(),
            documents: Arc::clone(&deps.documents),
            bridge: Arc::clone(&deps.bridge),
            embedder: BridgeEmbedder::new(Arc::clone(&deps.bridge)),
        }
    }

    fn surrounding_document(&self, text: &str, context: &Context) -> Result<String> {
        if let Some(document) = context.document() {
            return Ok(document.to_string());
        }
        let hits = self.documents.keyword_search(text, self.config.result_limit)?;
        if hits.is_empty() {
            return Ok(text.to_string());
        }
        Ok(hits
            .into_iter()
            .map(|hit| hit.content)
            .collect::<Vec<_>>()
            .join(SEPARATOR))
    }
}

#[async_trait]
impl StrategyExecutor for ContextualEnrichmentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ContextualEnrichment
    }

    async fn execute(&self, query: &Query, context: &Context) -> Result<Value> {
        let text = query_text(query)?;
        let document = self.surrounding_document(&text, context)?;
        let enriched = enrich(&self.bridge, &text, &document, &self.config).await?;
        if enriched.origin == ReplyOrigin::Fallback.as_str() {
            tracing::debug!("context generated by local extractive fallback");
        }

        let embedding = self.embedder.embed(&enriched.text).await?;
        let hits = self
            .documents
            .vector_search(&embedding, self.config.result_limit)?;

        Ok(json!({
            "results": hits,
            "enrichment": enriched,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support;

    #[test]
    fn test_window_keeps_everything_when_it_fits() {
        let (text, truncated) = compose_window("about auth", "login fails", 100);
        assert_eq!(text, "about auth\n\nlogin fails");
        assert!(!truncated);
    }

    #[test]
    fn test_window_truncates_context_first() {
        let context = "c".repeat(50);
        let content = "x".repeat(40);
        let (text, truncated) = compose_window(&context, &content, 52);
        assert!(truncated);
        assert!(text.ends_with(&content));
        assert_eq!(text.chars().count(), 52);
    }

    #[test]
    fn test_window_never_truncates_content() {
        let content = "y".repeat(300);
        let (text, truncated) = compose_window("context", &content, 100);
        assert_eq!(text, content);
        assert!(truncated);
    }

    #[tokio::test]
    async fn test_enrich_uses_extractive_fallback() {
        let deps = test_support::deps();
        let document = "The session cache stores refresh tokens. Session expiry triggers refresh.";
        let enriched = enrich(
            &deps.bridge,
            "session refresh",
            document,
            &EnrichmentConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(enriched.origin, "fallback");
        assert!(enriched.text.ends_with("session refresh"));
        assert!(enriched.context.contains("session"));
    }

    #[tokio::test]
    async fn test_strategy_returns_results() {
        let deps = test_support::deps();
        test_support::seed(&deps, &[("m1", "remember the session refresh incident")]).await;

        let result = ContextualEnrichmentStrategy::new(&deps)
            .run(&Query::from("recall the session refresh"), &Context::default())
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.item_count(), 1);
    }
}

//! Cache keys.

use crate::models::{Context, Query};
use crate::scoring::significant_terms;
use sha2::{Digest, Sha256};
use std::fmt;

/// Key of a consultation result.
///
/// `exact` hashes the normalized query, the context and the configuration
/// fingerprint. `pattern` hashes only the first few significant query words
/// (sorted) with the same context scope, so reworded queries share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    exact: String,
    pattern: Option<String>,
}

impl CacheKey {
    /// Derives the key for one consultation.
    #[must_use]
    pub fn new(query: &Query, context: &Context, fingerprint: &str, pattern_words: usize) -> Self {
        let scope = context_scope(context, fingerprint);
        let exact = digest(&["exact", &query.normalized(), &scope]);
        let pattern = query_pattern(&query.canonical_text(), pattern_words)
            .map(|pattern| digest(&["pattern", &pattern, &scope]));
        Self { exact, pattern }
    }

    /// Builds a key from a raw string, with no preload pattern.
    #[must_use]
    pub fn raw(key: impl AsRef<str>) -> Self {
        Self {
            exact: digest(&["raw", key.as_ref()]),
            pattern: None,
        }
    }

    /// Hex digest of the exact key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.exact
    }

    /// Hex digest of the preload pattern, when the query has significant words.
    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.exact)
    }
}

/// First `words` significant words of `text`, sorted and space-joined.
///
/// Significant words are ranked by frequency, so the pattern keeps the words
/// that characterize the query; sorting makes it order-insensitive.
#[must_use]
pub fn query_pattern(text: &str, words: usize) -> Option<String> {
    let mut selected: Vec<String> = significant_terms(text)
        .into_iter()
        .take(words)
        .map(|(term, _)| term)
        .collect();
    if selected.is_empty() {
        return None;
    }
    selected.sort_unstable();
    Some(selected.join(" "))
}

fn context_scope(context: &Context, fingerprint: &str) -> String {
    let mut hints: Vec<&str> = context.hints.iter().map(|h| h.as_str()).collect();
    hints.sort_unstable();
    hints.dedup();
    let fields = context
        .fields
        .iter()
        .map(|(k, v)| format!("{k}={}", digest(&[v])))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "src={}|dom={}|hints={}|fields={fields}|cfg={fingerprint}",
        context.source_label(),
        context.domain.as_deref().unwrap_or_default(),
        hints.join(","),
    )
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategyKind;

    #[test]
    fn test_whitespace_and_case_share_exact_key() {
        let ctx = Context::new();
        let a = CacheKey::new(&Query::from("Find  Retry logic"), &ctx, "cfg", 3);
        let b = CacheKey::new(&Query::from("find retry logic"), &ctx, "cfg", 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_context_and_config_scope_the_key() {
        let query = Query::from("find retry logic");
        let base = CacheKey::new(&query, &Context::new(), "cfg", 3);
        let sourced = CacheKey::new(&query, &Context::new().with_source("ide"), "cfg", 3);
        let hinted = CacheKey::new(
            &query,
            &Context::new().with_hint(StrategyKind::Reranking),
            "cfg",
            3,
        );
        let reconfigured = CacheKey::new(&query, &Context::new(), "cfg2", 3);
        assert_ne!(base, sourced);
        assert_ne!(base, hinted);
        assert_ne!(base, reconfigured);
        assert_ne!(base.pattern(), reconfigured.pattern());
    }

    #[test]
    fn test_reworded_queries_share_pattern() {
        let ctx = Context::new();
        let a = CacheKey::new(&Query::from("retry logic for database"), &ctx, "cfg", 3);
        let b = CacheKey::new(&Query::from("database retry logic"), &ctx, "cfg", 3);
        assert_ne!(a.as_str(), b.as_str());
        assert_eq!(a.pattern(), b.pattern());
    }

    #[test]
    fn test_pattern_requires_significant_words() {
        assert_eq!(query_pattern("is it to", 3), None);
        assert_eq!(
            query_pattern("zeta alpha zeta beta gamma", 2).as_deref(),
            Some("alpha zeta")
        );
    }
}

//! Query, context and query-analysis types.

use super::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A consultation query.
///
/// Either free text or a structured request. Both reduce to one canonical text
/// form used for hashing and classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    /// Free text.
    Text(String),
    /// Text plus structured fields.
    Structured(StructuredQuery),
}

/// A structured query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuredQuery {
    /// Primary text.
    pub text: String,
    /// Additional fields, ordered for stable canonicalization.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Query {
    /// Returns the primary text without canonicalization.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Structured(structured) => &structured.text,
        }
    }

    /// Returns the canonical text form.
    ///
    /// Whitespace is collapsed and structured fields are appended as
    /// `key:value` pairs in key order.
    #[must_use]
    pub fn canonical_text(&self) -> String {
        let mut canonical = collapse_whitespace(self.text());
        if let Self::Structured(structured) = self {
            for (key, value) in &structured.fields {
                let value = collapse_whitespace(value);
                if value.is_empty() {
                    continue;
                }
                if !canonical.is_empty() {
                    canonical.push(' ');
                }
                canonical.push_str(key);
                canonical.push(':');
                canonical.push_str(&value);
            }
        }
        canonical
    }

    /// Returns the lowercase canonical text used for cache keys.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.canonical_text().to_lowercase()
    }

    /// Returns true if the canonical text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canonical_text().is_empty()
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<StructuredQuery> for Query {
    fn from(structured: StructuredQuery) -> Self {
        Self::Structured(structured)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_text())
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Auxiliary fields accompanying a query.
///
/// Immutable for the duration of one consultation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    /// Identifier of the caller or document the query came from.
    #[serde(default)]
    pub source: Option<String>,
    /// Domain label (project, repository).
    #[serde(default)]
    pub domain: Option<String>,
    /// Strategies the caller would like to run in addition to the routed set.
    #[serde(default)]
    pub hints: Vec<StrategyKind>,
    /// Free-form fields. `document` and `code` are read by strategies.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Context {
    /// Field holding a surrounding document for contextual enrichment.
    pub const DOCUMENT_FIELD: &'static str = "document";
    /// Field holding source code for agentic analysis and extraction.
    pub const CODE_FIELD: &'static str = "code";

    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source identifier.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Adds a routing hint.
    #[must_use]
    pub fn with_hint(mut self, strategy: StrategyKind) -> Self {
        self.hints.push(strategy);
        self
    }

    /// Adds a free-form field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the surrounding document, if any.
    #[must_use]
    pub fn document(&self) -> Option<&str> {
        self.fields.get(Self::DOCUMENT_FIELD).map(String::as_str)
    }

    /// Returns attached source code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.fields.get(Self::CODE_FIELD).map(String::as_str)
    }

    /// Returns the source label, defaulting to `"query"`.
    #[must_use]
    pub fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or("query")
    }
}

/// Query classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Code-related query.
    CodeAnalysis,
    /// Search or lookup.
    SearchQuery,
    /// Error or bug investigation.
    ErrorAnalysis,
    /// Recall of prior memories.
    MemoryQuery,
    /// Anything else.
    #[default]
    General,
}

impl QueryType {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CodeAnalysis => "code_analysis",
            Self::SearchQuery => "search_query",
            Self::ErrorAnalysis => "error_analysis",
            Self::MemoryQuery => "memory_query",
            Self::General => "general",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Estimated query complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Short, simple query.
    Low,
    /// Default.
    #[default]
    Medium,
    /// Long query or code/error investigation.
    High,
}

impl Complexity {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of analysing a query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Classified type.
    pub query_type: QueryType,
    /// Estimated complexity.
    pub complexity: Complexity,
    /// Whether semantic search should run.
    pub requires_semantic_search: bool,
    /// Whether code analysis should run.
    pub requires_code_analysis: bool,
    /// Whether reranking should run.
    pub requires_reranking: bool,
    /// Length of the canonical text in characters.
    pub text_length: usize,
    /// Keywords that drove the classification.
    #[serde(default)]
    pub matched_terms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_text_collapses_whitespace() {
        let query = Query::from("  find   the\tparser \n");
        assert_eq!(query.canonical_text(), "find the parser");
    }

    #[test]
    fn test_structured_canonical_text_orders_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("lang".to_string(), "python".to_string());
        fields.insert("file".to_string(), "auth.py".to_string());
        let query = Query::from(StructuredQuery {
            text: "login bug".to_string(),
            fields,
        });
        assert_eq!(query.canonical_text(), "login bug file:auth.py lang:python");
        assert_eq!(query.text(), "login bug");
    }

    #[test]
    fn test_normalized_is_lowercase() {
        assert_eq!(Query::from("Find AUTH").normalized(), "find auth");
    }

    #[test]
    fn test_empty_query() {
        assert!(Query::from("   ").is_empty());
        assert!(!Query::from("x").is_empty());
    }

    #[test]
    fn test_context_fields() {
        let ctx = Context::new()
            .with_source("editor")
            .with_field(Context::CODE_FIELD, "fn main() {}");
        assert_eq!(ctx.source_label(), "editor");
        assert_eq!(ctx.code(), Some("fn main() {}"));
        assert!(ctx.document().is_none());
        assert_eq!(Context::new().source_label(), "query");
    }

    #[test]
    fn test_query_deserializes_untagged() {
        let text: Query = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(text, Query::from("hello"));
        let structured: Query =
            serde_json::from_str(r#"{"text":"hi","fields":{"a":"b"}}"#).unwrap();
        assert_eq!(structured.canonical_text(), "hi a:b");
    }
}

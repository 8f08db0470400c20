//! Keyword classification of queries.

use crate::config::RouterConfig;
use crate::models::{Complexity, Context, Query, QueryAnalysis, QueryType};
use crate::rules::{
    CODE_EXTENSIONS, CODE_TERMS, ERROR_TERMS, MEMORY_TERMS, SEARCH_TERMS, matched_categories,
};
use crate::scoring::tokenize;

/// Classifies a query.
///
/// Categories are applied in the order code, search, error, memory; a later
/// match overrides the type set by an earlier one while the flags accumulate.
#[must_use]
pub fn analyze(query: &Query, context: &Context, config: &RouterConfig) -> QueryAnalysis {
    let text = query.canonical_text();
    let tokens = tokenize(&text);
    let mut analysis = QueryAnalysis {
        text_length: text.chars().count(),
        ..QueryAnalysis::default()
    };

    let mut code_matches: Vec<String> = CODE_TERMS
        .matched(&tokens)
        .into_iter()
        .map(str::to_string)
        .collect();
    code_matches.extend(source_file_mentions(&text));
    if !code_matches.is_empty() || context.code().is_some() {
        analysis.query_type = QueryType::CodeAnalysis;
        analysis.requires_code_analysis = true;
        analysis.matched_terms.extend(code_matches);
    }

    let search_matches = SEARCH_TERMS.matched(&tokens);
    if !search_matches.is_empty() {
        analysis.query_type = QueryType::SearchQuery;
        analysis.requires_semantic_search = true;
        analysis.requires_reranking = true;
        analysis.matched_terms.extend(search_matches.into_iter().map(str::to_string));
    }

    let error_matches = ERROR_TERMS.matched(&tokens);
    if !error_matches.is_empty() {
        analysis.query_type = QueryType::ErrorAnalysis;
        analysis.requires_code_analysis = true;
        analysis.matched_terms.extend(error_matches.into_iter().map(str::to_string));
    }

    let memory_matches = MEMORY_TERMS.matched(&tokens);
    if !memory_matches.is_empty() {
        analysis.query_type = QueryType::MemoryQuery;
        analysis.matched_terms.extend(memory_matches.into_iter().map(str::to_string));
    }

    analysis.complexity = complexity(analysis.text_length, analysis.query_type, config);
    tracing::debug!(
        categories = ?matched_categories(&tokens),
        query_type = ?analysis.query_type,
        complexity = ?analysis.complexity,
        "query classified"
    );
    analysis
}

/// High for long text or code/error investigations, low for short text.
#[must_use]
pub fn complexity(text_length: usize, query_type: QueryType, config: &RouterConfig) -> Complexity {
    if text_length > config.long_query_chars
        || matches!(query_type, QueryType::CodeAnalysis | QueryType::ErrorAnalysis)
    {
        Complexity::High
    } else if text_length < config.short_query_chars {
        Complexity::Low
    } else {
        Complexity::Medium
    }
}

/// Words naming a source file, e.g. `auth.py` or `src/main.rs`.
fn source_file_mentions(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.trim_end_matches(|c: char| matches!(c, ',' | ';' | ':' | '?' | '!' | ')' | '"' | '\'')))
        .filter(|word| {
            let lowered = word.to_lowercase();
            CODE_EXTENSIONS.iter().any(|ext| {
                lowered.len() > ext.len() && lowered.ends_with(ext)
            })
        })
        .map(str::to_string)
        .collect()
}

//! Rule tables.
//!
//! Entity, relationship, code-pattern, language and routing rules live here as
//! data. Extraction and scoring code iterates the tables; nothing outside this
//! module embeds a pattern literal.
//!
//! Patterns compile lazily. A pattern that fails to compile yields `None` and
//! is skipped with a warning, so a bad rule disables itself instead of
//! aborting extraction.

mod code;
mod entity;
mod language;
mod relations;
mod routing;
mod words;

pub use code::{
    CodeMetric, CodeMetrics, CodePatternRule, ConfidenceFormula, PatternFamily, code_pattern_rules,
    is_definition_start,
};
pub use entity::{EntityRule, entity_rules, type_boost};
pub use language::{LanguageProfile, detect_language, language_profiles};
pub use relations::{relationship_type, type_compatibility};
pub use routing::{
    CODE_EXTENSIONS, CODE_TERMS, ERROR_TERMS, MEMORY_TERMS, ROUTING_TERM_SETS, SEARCH_TERMS,
    TermSet, matched_categories,
};
pub use words::{is_common_word, is_stop_word};

use regex::Regex;
use std::sync::LazyLock;

/// A lazily compiled pattern.
pub type LazyPattern = LazyLock<Option<Regex>>;

/// Compiles a pattern, logging and discarding it on failure.
pub(crate) fn compile(name: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(rule = name, error = %e, "rule pattern failed to compile");
            None
        },
    }
}

//! Read-only inputs owned by other subsystems.
//!
//! The corrections log is a plain text file searched line by line. Preference
//! records arrive already parsed; this module only matches them against query
//! terms.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A corrections-log line matching a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionMatch {
    /// 1-based line number.
    pub line_number: usize,
    /// Trimmed line text.
    pub line: String,
    /// Query terms found on the line.
    pub matched_terms: Vec<String>,
}

/// Historical corrections log.
#[derive(Debug, Clone)]
pub struct CorrectionsLog {
    path: PathBuf,
}

impl CorrectionsLog {
    /// Creates a handle. The file is read on every search.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines containing any of `terms` (case-insensitive), most matched terms
    /// first, then by line number.
    ///
    /// A missing file yields no matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn search(&self, terms: &[String], limit: usize) -> Result<Vec<CorrectionMatch>> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "corrections log not present");
                return Ok(Vec::new());
            },
            Err(e) => {
                return Err(Error::OperationFailed {
                    operation: "read_corrections_log".to_string(),
                    cause: format!("{}: {e}", self.path.display()),
                });
            },
        };

        let mut matches: Vec<CorrectionMatch> = contents
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let lowered = line.to_lowercase();
                let matched_terms: Vec<String> = terms
                    .iter()
                    .filter(|term| lowered.contains(term.as_str()))
                    .cloned()
                    .collect();
                (!matched_terms.is_empty()).then(|| CorrectionMatch {
                    line_number: index + 1,
                    line: line.trim().to_string(),
                    matched_terms,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.matched_terms
                .len()
                .cmp(&a.matched_terms.len())
                .then(a.line_number.cmp(&b.line_number))
        });
        matches.truncate(limit);
        Ok(matches)
    }
}

/// A preference record from the external preference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    /// Preference key, e.g. `error_handling`.
    pub key: String,
    /// Preference value.
    pub value: String,
    /// Optional grouping.
    #[serde(default)]
    pub category: Option<String>,
}

impl PreferenceRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            category: None,
        }
    }

    /// Whether any term occurs in the key, value or category.
    #[must_use]
    pub fn matches(&self, terms: &[String]) -> bool {
        let haystack = format!(
            "{} {} {}",
            self.key.replace('_', " "),
            self.value,
            self.category.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        terms.iter().any(|term| haystack.contains(term.as_str()))
    }
}

/// Records matching any of `terms`, in input order.
#[must_use]
pub fn matching_preferences<'a>(
    records: &'a [PreferenceRecord],
    terms: &[String],
) -> Vec<&'a PreferenceRecord> {
    records.iter().filter(|r| r.matches(terms)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn test_search_orders_by_match_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.log");
        std::fs::write(
            &path,
            "use retries for network calls\n\
             auth tokens expire: refresh before retries\n\
             unrelated line\n",
        )
        .unwrap();

        let log = CorrectionsLog::new(&path);
        let matches = log.search(&terms(&["retries", "auth"]), 10).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line_number, 2);
        assert_eq!(matches[0].matched_terms, terms(&["retries", "auth"]));
        assert_eq!(matches[1].line_number, 1);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let log = CorrectionsLog::new("/nonexistent/corrections.log");
        assert!(log.search(&terms(&["x"]), 5).unwrap().is_empty());
    }

    #[test]
    fn test_preference_matching() {
        let records = vec![
            PreferenceRecord::new("error_handling", "prefer Result over panics"),
            PreferenceRecord {
                category: Some("style".to_string()),
                ..PreferenceRecord::new("indent", "four spaces")
            },
        ];
        let matched = matching_preferences(&records, &terms(&["error"]));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].key, "error_handling");
        assert_eq!(matching_preferences(&records, &terms(&["style"])).len(), 1);
        assert!(matching_preferences(&records, &[]).is_empty());
    }
}

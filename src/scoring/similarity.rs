//! Token and vector similarity helpers.

use crate::rules::is_stop_word;
use std::collections::{BTreeMap, HashSet};

/// Splits text into lowercase alphanumeric tokens of at least two characters.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard overlap between the token sets of two texts, in [0, 1].
#[must_use]
pub fn jaccard(a: &str, b: &str) -> f32 {
    let left: HashSet<String> = tokenize(a).into_iter().collect();
    let right: HashSet<String> = tokenize(b).into_iter().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f32 / union as f32
}

/// Returns non-stop-word terms ordered by descending frequency, then alphabetically.
#[must_use]
pub fn significant_terms(text: &str) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for token in tokenize(text) {
        if token.len() < 3 || is_stop_word(&token) {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }
    let mut terms: Vec<(String, usize)> = counts.into_iter().collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms
}

/// Cosine similarity in [-1, 1], or 0 when the vectors are empty, differ in
/// length or have zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_short_and_punctuation() {
        assert_eq!(
            tokenize("Find a bug in auth.py!"),
            vec!["find", "bug", "in", "auth", "py"]
        );
    }

    #[test]
    fn test_jaccard_bounds() {
        assert!((jaccard("alpha beta", "alpha beta") - 1.0).abs() < f32::EPSILON);
        assert!(jaccard("alpha", "gamma").abs() < f32::EPSILON);
        assert!(jaccard("", "gamma").abs() < f32::EPSILON);
        let partial = jaccard("alpha beta", "alpha gamma");
        assert!((partial - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_significant_terms_skip_stop_words() {
        let terms = significant_terms("the cache and the cache eviction");
        assert_eq!(terms[0], ("cache".to_string(), 2));
        assert!(terms.iter().all(|(t, _)| t != "the" && t != "and"));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[], &[]).abs() < f32::EPSILON);
    }
}

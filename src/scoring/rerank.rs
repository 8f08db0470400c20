//! Rerank score blending.

use super::similarity::jaccard;
use crate::models::{RerankedHit, SearchHit};
use std::cmp::Ordering;

/// Blend weights and filter threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankWeights {
    /// Weight of the pre-rerank score.
    pub original: f32,
    /// Weight of the cross-encoder score.
    pub cross_encoder: f32,
    /// Blended scores below this are dropped.
    pub min_score: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            original: 0.3,
            cross_encoder: 0.7,
            min_score: 0.1,
        }
    }
}

/// `original * w_o + cross_encoder * w_c`.
#[must_use]
pub fn combined_rerank_score(original: f32, cross_encoder: f32, weights: &RerankWeights) -> f32 {
    original * weights.original + cross_encoder * weights.cross_encoder
}

/// Local relevance used when no cross-encoder is reachable: token Jaccard plus
/// a boost when the whole query occurs in the text. Capped at 1.
#[must_use]
pub fn fallback_relevance(query: &str, text: &str, exact_match_boost: f32) -> f32 {
    let mut score = jaccard(query, text);
    let needle = query.trim().to_lowercase();
    if !needle.is_empty() && text.to_lowercase().contains(&needle) {
        score += exact_match_boost;
    }
    score.clamp(0.0, 1.0)
}

/// Blends scores, drops candidates under the threshold and sorts descending.
///
/// `cross_scores[i]` belongs to `candidates[i]`. A missing score counts as 0.
#[must_use]
pub fn rerank(
    candidates: &[SearchHit],
    cross_scores: &[f32],
    weights: &RerankWeights,
) -> Vec<RerankedHit> {
    let mut reranked: Vec<RerankedHit> = candidates
        .iter()
        .enumerate()
        .map(|(index, hit)| {
            let cross = cross_scores.get(index).copied().unwrap_or(0.0);
            RerankedHit {
                hit: hit.clone(),
                original_score: hit.score,
                cross_encoder_score: cross,
                score: combined_rerank_score(hit.score, cross, weights),
            }
        })
        .filter(|r| r.score >= weights.min_score)
        .collect();

    reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    reranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_score_weights() {
        let score = combined_rerank_score(1.0, 0.5, &RerankWeights::default());
        assert!((score - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_exact_match_boost() {
        let plain = fallback_relevance("retry backoff", "backoff then retry", 0.2);
        let exact = fallback_relevance("retry backoff", "use retry backoff here", 0.2);
        assert!(exact > plain);
    }

    #[test]
    fn test_rerank_filters_and_sorts() {
        let candidates = vec![
            SearchHit::new("a", "alpha", 0.1),
            SearchHit::new("b", "beta", 0.2),
            SearchHit::new("c", "gamma", 0.0),
        ];
        let reranked = rerank(&candidates, &[0.9, 0.1, 0.0], &RerankWeights::default());

        let ids: Vec<&str> = reranked.iter().map(|r| r.hit.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((reranked[0].score - (0.03 + 0.63)).abs() < 1e-6);
    }
}

//! Weighted Reciprocal Rank Fusion.
//!
//! For each document `d` appearing in list `l` at 1-based rank `r`:
//!
//! ```text
//! score(d) += weight_l / (k + r)
//! ```
//!
//! With `k = 60`, vector weight `0.7` and keyword weight `0.3`:
//!
//! ```text
//! Vector:  [B@1, C@2]        Keyword: [A@1, B@2]
//! A: 0.3/61            = 0.00492
//! B: 0.7/61 + 0.3/62   = 0.01631  (boosted)
//! C: 0.7/62            = 0.01129
//! Final: [B, C, A]
//! ```

use crate::models::{FusedHit, RankProvenance, RankSource, SearchHit};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One ranked input list.
#[derive(Debug, Clone, Copy)]
pub struct RankedList<'a> {
    /// Which retrieval source produced the list.
    pub source: RankSource,
    /// Weight applied to every contribution from this list.
    pub weight: f32,
    /// Hits, best first.
    pub hits: &'a [SearchHit],
}

impl<'a> RankedList<'a> {
    /// Creates a ranked list.
    #[must_use]
    pub const fn new(source: RankSource, weight: f32, hits: &'a [SearchHit]) -> Self {
        Self {
            source,
            weight,
            hits,
        }
    }
}

/// Fuses ranked lists, returning at most `limit` hits sorted by descending score.
///
/// A document that appears more than once in the same list only counts at its
/// best rank. Hits ranked by more than one source are flagged `boosted`. Ties
/// are broken by document id so output is deterministic.
#[must_use]
pub fn weighted_rrf(lists: &[RankedList<'_>], k: f32, limit: usize) -> Vec<FusedHit> {
    let capacity: usize = lists.iter().map(|l| l.hits.len()).sum();
    let mut fused: HashMap<&str, FusedHit> = HashMap::with_capacity(capacity);

    for list in lists {
        for (index, hit) in list.hits.iter().enumerate() {
            let rank = index + 1;
            let contribution = list.weight / (k + rank as f32);
            let provenance = RankProvenance {
                source: list.source,
                rank,
                raw_score: hit.score,
                contribution,
            };

            let entry = fused.entry(hit.id.as_str()).or_insert_with(|| FusedHit {
                hit: hit.clone(),
                score: 0.0,
                boosted: false,
                provenance: Vec::new(),
            });
            if entry.provenance.iter().any(|p| p.source == list.source) {
                continue;
            }
            entry.score += contribution;
            entry.provenance.push(provenance);
            entry.boosted = entry.provenance.len() > 1;
        }
    }

    let mut results: Vec<FusedHit> = fused.into_values().collect();
    results.sort_unstable_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.hit.id.cmp(&b.hit.id))
    });
    results.truncate(limit);
    results
}

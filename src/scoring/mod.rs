//! Pure scoring functions.
//!
//! Nothing in this module performs I/O. Strategy executors gather inputs
//! (search hits, bridge scores, extracted spans) and hand them here.
//!
//! | Function | Formula |
//! |----------|---------|
//! | [`weighted_rrf`] | `sum(weight_source / (k + rank))` |
//! | [`entity_confidence`] | `0.6 + type_boost - common_penalty + freq(<=0.2) + caps(0.05) + len(0.05)` |
//! | [`relationship_strength`] | `0.3 prox + 0.3 semantic + 0.2 co_occurrence + 0.2 compatibility` |
//! | [`combined_rerank_score`] | `0.3 original + 0.7 cross_encoder` |

// Scores are computed from small counts and ranks.
#![allow(clippy::cast_precision_loss)]

mod entity;
mod relationship;
mod rerank;
mod rrf;
mod similarity;

pub use entity::{EntitySignals, entity_confidence};
pub use relationship::{
    PairSignals, proximity_score, relationship_strength, semantic_similarity,
};
pub use rerank::{RerankWeights, combined_rerank_score, fallback_relevance, rerank};
pub use rrf::{RankedList, weighted_rrf};
pub use similarity::{cosine_similarity, jaccard, significant_terms, tokenize};

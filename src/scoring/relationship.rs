//! Relationship strength.

const PROXIMITY_WEIGHT: f32 = 0.3;
const SEMANTIC_WEIGHT: f32 = 0.3;
const CO_OCCURRENCE_WEIGHT: f32 = 0.2;
const COMPATIBILITY_WEIGHT: f32 = 0.2;

const TYPE_MATCH_WEIGHT: f32 = 0.6;
const TOKEN_OVERLAP_WEIGHT: f32 = 0.4;

/// Character distance tiers and their proximity scores.
const PROXIMITY_TIERS: [(usize, f32); 5] = [(50, 1.0), (150, 0.8), (300, 0.6), (600, 0.4), (1_200, 0.2)];
const FAR_PROXIMITY: f32 = 0.1;

/// Observations about one entity pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSignals {
    /// Character distance between the two spans.
    pub distance: usize,
    /// Whether both entities share a type.
    pub same_type: bool,
    /// Token overlap between the two names, in [0, 1].
    pub token_overlap: f32,
    /// Sentence co-occurrence, in [0, 1].
    pub co_occurrence: f32,
    /// Looked-up type compatibility, in [0, 1].
    pub type_compatibility: f32,
}

/// Step function of character distance.
#[must_use]
pub fn proximity_score(distance: usize) -> f32 {
    PROXIMITY_TIERS
        .iter()
        .find(|(limit, _)| distance <= *limit)
        .map_or(FAR_PROXIMITY, |(_, score)| *score)
}

/// Blends type match and token overlap.
#[must_use]
pub fn semantic_similarity(same_type: bool, token_overlap: f32) -> f32 {
    let type_match = if same_type { 1.0 } else { 0.0 };
    TYPE_MATCH_WEIGHT * type_match + TOKEN_OVERLAP_WEIGHT * unit(token_overlap)
}

/// Computes relationship strength clamped to [0, 1].
#[must_use]
pub fn relationship_strength(signals: &PairSignals) -> f32 {
    let strength = PROXIMITY_WEIGHT * proximity_score(signals.distance)
        + SEMANTIC_WEIGHT * semantic_similarity(signals.same_type, signals.token_overlap)
        + CO_OCCURRENCE_WEIGHT * unit(signals.co_occurrence)
        + COMPATIBILITY_WEIGHT * unit(signals.type_compatibility);
    unit(strength)
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

//! Entity confidence.

const BASE_CONFIDENCE: f32 = 0.6;
const COMMON_WORD_PENALTY: f32 = 0.3;
const FREQUENCY_STEP: f32 = 0.05;
const MAX_FREQUENCY_BOOST: f32 = 0.2;
const CAPITALIZATION_BOOST: f32 = 0.05;
const LENGTH_BOOST: f32 = 0.05;
const MIN_BOOSTED_LENGTH: usize = 4;
const MAX_BOOSTED_LENGTH: usize = 40;

/// Observations about one extracted match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySignals {
    /// Boost for the entity category.
    pub type_boost: f32,
    /// Whether the name is a common English word.
    pub common_word: bool,
    /// Occurrences of the name in the content.
    pub occurrences: usize,
    /// Whether the name starts with an uppercase letter.
    pub capitalized: bool,
    /// Name length in characters.
    pub length: usize,
}

/// Computes an entity confidence clamped to [0, 1].
#[must_use]
pub fn entity_confidence(signals: &EntitySignals) -> f32 {
    let mut confidence = BASE_CONFIDENCE + signals.type_boost;

    if signals.common_word {
        confidence -= COMMON_WORD_PENALTY;
    }

    let repeats = signals.occurrences.saturating_sub(1) as f32;
    confidence += (repeats * FREQUENCY_STEP).min(MAX_FREQUENCY_BOOST);

    if signals.capitalized {
        confidence += CAPITALIZATION_BOOST;
    }
    if (MIN_BOOSTED_LENGTH..=MAX_BOOSTED_LENGTH).contains(&signals.length) {
        confidence += LENGTH_BOOST;
    }

    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn signals(type_boost: f32, common_word: bool, occurrences: usize) -> EntitySignals {
        EntitySignals {
            type_boost,
            common_word,
            occurrences,
            capitalized: false,
            length: 2,
        }
    }

    #[test_case(0.0, false, 1, 0.6 ; "base only")]
    #[test_case(0.2, false, 1, 0.8 ; "type boost")]
    #[test_case(0.0, true, 1, 0.3 ; "common word penalty")]
    #[test_case(0.0, false, 3, 0.7 ; "frequency boost")]
    #[test_case(0.0, false, 50, 0.8 ; "frequency boost capped")]
    fn test_confidence_components(type_boost: f32, common: bool, occurrences: usize, expected: f32) {
        let confidence = entity_confidence(&signals(type_boost, common, occurrences));
        assert!((confidence - expected).abs() < 1e-6, "got {confidence}");
    }

    #[test]
    fn test_confidence_clamped() {
        let high = EntitySignals {
            type_boost: 0.2,
            common_word: false,
            occurrences: 20,
            capitalized: true,
            length: 10,
        };
        assert!((entity_confidence(&high) - 1.0).abs() < f32::EPSILON);

        let low = EntitySignals {
            type_boost: -2.0,
            ..high
        };
        assert!(entity_confidence(&low).abs() < f32::EPSILON);
    }
}

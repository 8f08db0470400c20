//! Cognify phase: relationship inference over entity pairs.

use crate::config::PipelineConfig;
use crate::models::{Entity, Relationship};
use crate::rules::{relationship_type, type_compatibility};
use crate::scoring::{PairSignals, proximity_score, relationship_strength, semantic_similarity};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;

/// Co-occurrence for two mentions in the same sentence.
const SAME_SENTENCE: f32 = 1.0;
/// Co-occurrence for two mentions in the same paragraph.
const SAME_PARAGRAPH: f32 = 0.5;

/// Output of the Cognify phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CognifyOutput {
    /// Relationships at or above the threshold, strongest first.
    pub relationships: Vec<Relationship>,
    /// Pairs scored.
    pub pairs_scored: usize,
    /// Pairs below the threshold.
    pub dropped: usize,
    /// Whether scoring stopped at the pair limit.
    pub truncated: bool,
}

/// Scores every unordered entity pair and keeps the strong ones.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if an entity span lies outside `content`.
pub fn cognify(entities: &[Entity], content: &str, config: &PipelineConfig) -> Result<CognifyOutput> {
    if let Some(entity) = entities.iter().find(|e| e.span.end > content.len()) {
        return Err(Error::InvalidInput(format!(
            "entity '{}' spans {}..{} beyond content length {}",
            entity.name,
            entity.span.start,
            entity.span.end,
            content.len()
        )));
    }

    let layout = TextLayout::new(content);
    let mut output = CognifyOutput::default();

    'pairs: for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            if output.pairs_scored >= config.max_pairs {
                output.truncated = true;
                break 'pairs;
            }
            output.pairs_scored += 1;

            let signals = PairSignals {
                distance: a.span.distance(&b.span),
                same_type: a.entity_type == b.entity_type,
                token_overlap: name_overlap(&a.name, &b.name),
                co_occurrence: layout.co_occurrence(a.span.start, b.span.start),
                type_compatibility: type_compatibility(a.entity_type, b.entity_type),
            };
            let strength = relationship_strength(&signals);
            if strength < config.relationship_threshold {
                output.dropped += 1;
                continue;
            }

            let (kind, reversed) = relationship_type(a.entity_type, b.entity_type);
            let (source, target) = if reversed { (b, a) } else { (a, b) };
            output.relationships.push(
                Relationship::new(source, target, kind, strength)
                    .with_property("proximity", proximity_score(signals.distance))
                    .with_property(
                        "semantic_similarity",
                        semantic_similarity(signals.same_type, signals.token_overlap),
                    )
                    .with_property("co_occurrence", signals.co_occurrence)
                    .with_property("type_compatibility", signals.type_compatibility)
                    .with_property("distance", signals.distance),
            );
        }
    }

    if output.truncated {
        tracing::warn!(
            max_pairs = config.max_pairs,
            entities = entities.len(),
            "cognify stopped at the pair limit"
        );
    }

    output.relationships.sort_by(|x, y| {
        y.strength
            .total_cmp(&x.strength)
            .then_with(|| x.id.cmp(&y.id))
    });
    Ok(output)
}

/// Jaccard overlap of the lowercase parts of two names, splitting on
/// non-alphanumerics, underscores and camelCase boundaries.
fn name_overlap(a: &str, b: &str) -> f32 {
    let left = name_parts(a);
    let right = name_parts(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    #[allow(clippy::cast_precision_loss)]
    let overlap = shared as f32 / union as f32;
    overlap
}

fn name_parts(name: &str) -> HashSet<String> {
    let mut parts = HashSet::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut parts);
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower {
            flush(&mut current, &mut parts);
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    flush(&mut current, &mut parts);
    parts
}

fn flush(current: &mut String, parts: &mut HashSet<String>) {
    if !current.is_empty() {
        parts.insert(std::mem::take(current));
    }
}

/// Sentence and paragraph boundaries of a text.
struct TextLayout {
    sentence_breaks: Vec<usize>,
    paragraph_breaks: Vec<usize>,
}

impl TextLayout {
    fn new(content: &str) -> Self {
        let bytes = content.as_bytes();
        let mut sentence_breaks = Vec::new();
        let mut paragraph_breaks = Vec::new();
        for (i, byte) in bytes.iter().enumerate() {
            let next = bytes.get(i + 1).copied();
            match byte {
                b'\n' => {
                    sentence_breaks.push(i);
                    if next == Some(b'\n') {
                        paragraph_breaks.push(i);
                    }
                },
                b'.' | b'!' | b'?' if next.is_none_or(|n| n.is_ascii_whitespace()) => {
                    sentence_breaks.push(i);
                },
                _ => {},
            }
        }
        Self {
            sentence_breaks,
            paragraph_breaks,
        }
    }

    fn co_occurrence(&self, a: usize, b: usize) -> f32 {
        if region(&self.sentence_breaks, a) == region(&self.sentence_breaks, b) {
            SAME_SENTENCE
        } else if region(&self.paragraph_breaks, a) == region(&self.paragraph_breaks, b) {
            SAME_PARAGRAPH
        } else {
            0.0
        }
    }
}

fn region(breaks: &[usize], offset: usize) -> usize {
    breaks.partition_point(|b| *b < offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityType, RelationshipType, Span};

    fn entity(content: &str, name: &str, entity_type: EntityType) -> Entity {
        let start = content.find(name).unwrap();
        Entity::new(name, entity_type, 0.8, "t", Span::new(start, start + name.len()))
    }

    #[test]
    fn test_close_compatible_pair_related() {
        let content = "class AuthService defines login_user for sessions.";
        let class = entity(content, "AuthService", EntityType::Class);
        let function = entity(content, "login_user", EntityType::Function);

        let output = cognify(&[function, class.clone()], content, &PipelineConfig::default()).unwrap();
        assert_eq!(output.relationships.len(), 1);
        let rel = &output.relationships[0];
        assert_eq!(rel.relationship_type, RelationshipType::Defines);
        assert_eq!(rel.source_entity_id, class.id);
        // 0.3*1.0 + 0.3*0.0 + 0.2*1.0 + 0.2*0.9
        assert!((rel.strength - 0.68).abs() < 1e-5);
    }

    #[test]
    fn test_weak_pairs_dropped() {
        let filler = "x ".repeat(800);
        let content = format!("Docker here.\n\n{filler}\n\nsome_value there.");
        let tech = entity(&content, "Docker", EntityType::Technology);
        let ident = entity(&content, "some_value", EntityType::Identifier);

        let output = cognify(&[tech, ident], &content, &PipelineConfig::default()).unwrap();
        assert!(output.relationships.is_empty());
        assert_eq!(output.dropped, 1);
    }

    #[test]
    fn test_threshold_is_respected() {
        let content = "parse_token calls read_token and check_token in tokenizer.rs.";
        let entities = vec![
            entity(content, "parse_token", EntityType::Function),
            entity(content, "read_token", EntityType::Function),
            entity(content, "check_token", EntityType::Function),
            entity(content, "tokenizer.rs", EntityType::File),
        ];
        let config = PipelineConfig {
            relationship_threshold: 0.75,
            ..PipelineConfig::default()
        };
        let output = cognify(&entities, content, &config).unwrap();
        assert_eq!(output.pairs_scored, 6);
        assert!(output.relationships.iter().all(|r| r.strength >= 0.75));
    }

    #[test]
    fn test_pair_limit_truncates() {
        let content = "alpha_one beta_two gamma_three";
        let entities = vec![
            entity(content, "alpha_one", EntityType::Identifier),
            entity(content, "beta_two", EntityType::Identifier),
            entity(content, "gamma_three", EntityType::Identifier),
        ];
        let config = PipelineConfig {
            max_pairs: 2,
            ..PipelineConfig::default()
        };
        let output = cognify(&entities, content, &config).unwrap();
        assert_eq!(output.pairs_scored, 2);
        assert!(output.truncated);
    }

    #[test]
    fn test_out_of_range_span_rejected() {
        let bogus = Entity::new("ghost", EntityType::Concept, 0.9, "t", Span::new(10, 500));
        assert!(cognify(&[bogus], "short", &PipelineConfig::default()).is_err());
    }

    #[test]
    fn test_name_parts_split_styles() {
        let parts = name_parts("parseHTTPRequest_v2");
        assert!(parts.contains("parse"));
        assert!(parts.contains("v2"));
        assert!((name_overlap("read_token", "tokenRead") - 1.0).abs() < f32::EPSILON);
        assert!(name_overlap("", "x").abs() < f32::EPSILON);
    }
}

//! Extract phase: rule-based entity recognition.

use crate::config::PipelineConfig;
use crate::models::{Entity, EntityType, Span};
use crate::rules::{entity_rules, is_common_word, type_boost};
use crate::scoring::{EntitySignals, entity_confidence};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Output of the Extract phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractOutput {
    /// Kept entities, highest confidence first.
    pub entities: Vec<Entity>,
    /// Distinct candidates before filtering.
    pub candidates: usize,
    /// Candidates below the confidence threshold or over the cap.
    pub discarded: usize,
}

struct Candidate {
    name: String,
    entity_type: EntityType,
    rule: &'static str,
    span: Span,
    occurrences: usize,
}

/// Extracts entities from `content`.
///
/// Rules run most specific first. A name claimed by one entity type is not
/// re-extracted under another, so `parse_token` found by the function rule is
/// not also reported as an identifier.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for blank content.
pub fn extract(content: &str, source: &str, config: &PipelineConfig) -> Result<ExtractOutput> {
    if content.trim().is_empty() {
        return Err(Error::InvalidInput("nothing to extract from".to_string()));
    }

    let mut order: Vec<(EntityType, String)> = Vec::new();
    let mut candidates: HashMap<(EntityType, String), Candidate> = HashMap::new();
    let mut claimed: HashMap<String, EntityType> = HashMap::new();

    for rule in entity_rules() {
        let Some(pattern) = rule.pattern.as_ref() else {
            continue;
        };
        for captures in pattern.captures_iter(content) {
            let Some(matched) = captures.get(1).or_else(|| captures.get(0)) else {
                continue;
            };
            let name = matched.as_str().trim();
            if name.chars().count() < 2 {
                continue;
            }
            let folded = name.to_lowercase();
            match claimed.get(&folded) {
                Some(owner) if *owner != rule.entity_type => continue,
                Some(_) => {},
                None => {
                    claimed.insert(folded.clone(), rule.entity_type);
                },
            }

            let key = (rule.entity_type, folded);
            if let Some(candidate) = candidates.get_mut(&key) {
                if matched.start() != candidate.span.start {
                    candidate.occurrences += 1;
                }
                continue;
            }
            order.push(key.clone());
            candidates.insert(
                key,
                Candidate {
                    name: name.to_string(),
                    entity_type: rule.entity_type,
                    rule: rule.name,
                    span: Span::new(matched.start(), matched.end()),
                    occurrences: 1,
                },
            );
        }
    }

    let total = order.len();
    let mut entities: Vec<Entity> = order
        .into_iter()
        .filter_map(|key| candidates.remove(&key))
        .map(|candidate| score(candidate, source))
        .filter(|entity| entity.confidence >= config.min_entity_confidence)
        .collect();

    entities.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.span.start.cmp(&b.span.start))
    });
    entities.truncate(config.max_entities);

    Ok(ExtractOutput {
        discarded: total - entities.len(),
        candidates: total,
        entities,
    })
}

fn score(candidate: Candidate, source: &str) -> Entity {
    let signals = EntitySignals {
        type_boost: type_boost(candidate.entity_type),
        common_word: is_common_word(&candidate.name),
        occurrences: candidate.occurrences,
        capitalized: candidate.name.chars().next().is_some_and(char::is_uppercase),
        length: candidate.name.chars().count(),
    };
    Entity::new(
        candidate.name,
        candidate.entity_type,
        entity_confidence(&signals),
        source,
        candidate.span,
    )
    .with_property("rule", candidate.rule)
    .with_property("occurrences", candidate.occurrences)
}

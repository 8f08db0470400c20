//! Type compatibility and relationship type mapping.

use crate::models::{EntityType, RelationshipType};

const DEFAULT_COMPATIBILITY: f32 = 0.3;

/// Symmetric compatibility entries. Each unordered pair appears once.
const COMPATIBILITY: &[(EntityType, EntityType, f32)] = &[
    (EntityType::Class, EntityType::Function, 0.9),
    (EntityType::File, EntityType::Function, 0.8),
    (EntityType::File, EntityType::Class, 0.8),
    (EntityType::ErrorType, EntityType::Function, 0.8),
    (EntityType::Function, EntityType::Function, 0.7),
    (EntityType::Class, EntityType::Class, 0.7),
    (EntityType::Technology, EntityType::Concept, 0.7),
    (EntityType::Function, EntityType::Identifier, 0.6),
    (EntityType::ErrorType, EntityType::Class, 0.6),
    (EntityType::Technology, EntityType::Technology, 0.6),
    (EntityType::Concept, EntityType::Concept, 0.6),
    (EntityType::File, EntityType::Technology, 0.5),
    (EntityType::ErrorType, EntityType::File, 0.5),
    (EntityType::Concept, EntityType::Function, 0.5),
    (EntityType::Class, EntityType::Identifier, 0.5),
];

/// Directed mapping: (source type, target type) -> relationship.
const RELATIONSHIP_MAP: &[(EntityType, EntityType, RelationshipType)] = &[
    (EntityType::File, EntityType::Function, RelationshipType::Contains),
    (EntityType::File, EntityType::Class, RelationshipType::Contains),
    (EntityType::Class, EntityType::Function, RelationshipType::Defines),
    (EntityType::Function, EntityType::Function, RelationshipType::Calls),
    (EntityType::Function, EntityType::Identifier, RelationshipType::Uses),
    (EntityType::Class, EntityType::Identifier, RelationshipType::Uses),
    (EntityType::ErrorType, EntityType::Function, RelationshipType::RaisedBy),
    (EntityType::ErrorType, EntityType::Class, RelationshipType::RaisedBy),
    (EntityType::Technology, EntityType::Technology, RelationshipType::DependsOn),
    (EntityType::File, EntityType::Technology, RelationshipType::DependsOn),
    (EntityType::Concept, EntityType::Concept, RelationshipType::SimilarTo),
];

/// Looks up compatibility for an unordered type pair.
#[must_use]
pub fn type_compatibility(a: EntityType, b: EntityType) -> f32 {
    COMPATIBILITY
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map_or(DEFAULT_COMPATIBILITY, |(_, _, score)| *score)
}

/// Maps a type pair to a relationship type.
///
/// Returns the type and whether the pair must be reversed so the source
/// entity comes first.
#[must_use]
pub fn relationship_type(a: EntityType, b: EntityType) -> (RelationshipType, bool) {
    for (source, target, relationship) in RELATIONSHIP_MAP {
        if *source == a && *target == b {
            return (*relationship, false);
        }
        if *source == b && *target == a {
            return (*relationship, true);
        }
    }
    (RelationshipType::RelatesTo, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_is_symmetric() {
        for a in EntityType::all() {
            for b in EntityType::all() {
                let forward = type_compatibility(*a, *b);
                let backward = type_compatibility(*b, *a);
                assert!((forward - backward).abs() < f32::EPSILON);
                assert!((0.0..=1.0).contains(&forward));
            }
        }
    }

    #[test]
    fn test_compatibility_default() {
        let score = type_compatibility(EntityType::Concept, EntityType::Identifier);
        assert!((score - DEFAULT_COMPATIBILITY).abs() < f32::EPSILON);
    }

    #[test]
    fn test_relationship_orientation() {
        assert_eq!(
            relationship_type(EntityType::Function, EntityType::File),
            (RelationshipType::Contains, true)
        );
        assert_eq!(
            relationship_type(EntityType::Class, EntityType::Function),
            (RelationshipType::Defines, false)
        );
        assert_eq!(
            relationship_type(EntityType::Concept, EntityType::Identifier),
            (RelationshipType::RelatesTo, false)
        );
    }
}

// Allow non-const functions that use f32::clamp (not const-stable yet)
#![allow(clippy::missing_const_for_fn)]

//! Entity and relationship types produced by the Extract–Cognify–Load pipeline.
//!
//! Entities are created only by the Extract phase and never mutated afterwards;
//! relationships are created only by the Cognify phase and only reference
//! entities by id.
//!
//! # Entity Types
//!
//! | Type | Description | Examples |
//! |------|-------------|----------|
//! | `Technology` | Tools, frameworks, languages | "Rust", "`PostgreSQL`", "Docker" |
//! | `Function` | Function or method definitions | "`parse_token`", "`handleLogin`" |
//! | `Class` | Classes, structs, traits, interfaces | "`AuthService`" |
//! | `File` | Source and config files | "auth.py", "src/main.rs" |
//! | `ErrorType` | Error and exception names | "`ValueError`", "`IoError`" |
//! | `Concept` | Capitalised multi-word phrases | "Event Sourcing" |
//! | `Identifier` | `snake_case` / `camelCase` identifiers | "`user_id`" |

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Type of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Tools, frameworks, languages.
    Technology,
    /// Function or method definitions.
    Function,
    /// Classes, structs, traits, interfaces.
    Class,
    /// Source and config files.
    File,
    /// Error and exception names.
    ErrorType,
    /// Capitalised multi-word phrases.
    Concept,
    /// Code identifiers that are not definitions.
    Identifier,
}

impl EntityType {
    /// Returns all entity type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Technology,
            Self::Function,
            Self::Class,
            Self::File,
            Self::ErrorType,
            Self::Concept,
            Self::Identifier,
        ]
    }

    /// Returns the entity type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::Function => "function",
            Self::Class => "class",
            Self::File => "file",
            Self::ErrorType => "error_type",
            Self::Concept => "concept",
            Self::Identifier => "identifier",
        }
    }

    /// Parses an entity type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "technology" | "tech" | "tool" | "framework" | "language" => Some(Self::Technology),
            "function" | "method" | "fn" => Some(Self::Function),
            "class" | "struct" | "trait" | "interface" | "type" => Some(Self::Class),
            "file" | "path" => Some(Self::File),
            "error_type" | "error" | "exception" => Some(Self::ErrorType),
            "concept" | "idea" | "pattern" => Some(Self::Concept),
            "identifier" | "ident" | "variable" => Some(Self::Identifier),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type of relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// A file or class contains a definition.
    Contains,
    /// A class defines a method.
    Defines,
    /// A function calls another function.
    Calls,
    /// Code uses a technology.
    Uses,
    /// An error is raised by a function or file.
    RaisedBy,
    /// A technology or file depends on another.
    DependsOn,
    /// Two entities of the same kind resemble each other.
    SimilarTo,
    /// General association.
    RelatesTo,
}

impl RelationshipType {
    /// Returns the relationship type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Defines => "defines",
            Self::Calls => "calls",
            Self::Uses => "uses",
            Self::RaisedBy => "raised_by",
            Self::DependsOn => "depends_on",
            Self::SimilarTo => "similar_to",
            Self::RelatesTo => "relates_to",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Character span of an entity mention in the source text (byte offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Distance in characters between the starts of two spans.
    #[must_use]
    pub const fn distance(&self, other: &Self) -> usize {
        self.start.abs_diff(other.start)
    }
}

/// An entity extracted from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic identifier derived from type and normalized name.
    pub id: String,
    /// Surface name as first seen.
    pub name: String,
    /// Entity type.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f32,
    /// Where the text came from (document id, context source, or "query").
    pub source: String,
    /// Span of the first mention.
    pub span: Span,
    /// Free-form properties (mention count, matching rule).
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    /// Builds an entity, deriving its id and clamping confidence.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        confidence: f32,
        source: impl Into<String>,
        span: Span,
    ) -> Self {
        let name = name.into();
        Self {
            id: entity_id(entity_type, &name),
            name,
            entity_type,
            confidence: confidence.clamp(0.0, 1.0),
            source: source.into(),
            span,
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// A relationship inferred between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Deterministic identifier derived from the endpoint ids and type.
    pub id: String,
    /// Source entity id.
    pub source_entity_id: String,
    /// Target entity id.
    pub target_entity_id: String,
    /// Relationship type.
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    /// Strength in `[0, 1]`.
    pub strength: f32,
    /// Score components and other properties.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Relationship {
    /// Builds a relationship, deriving its id and clamping strength.
    #[must_use]
    pub fn new(
        source: &Entity,
        target: &Entity,
        relationship_type: RelationshipType,
        strength: f32,
    ) -> Self {
        let key = format!(
            "{}|{}|{}",
            source.id,
            target.id,
            relationship_type.as_str()
        );
        Self {
            id: format!("rel_{}", short_hash(&key)),
            source_entity_id: source.id.clone(),
            target_entity_id: target.id.clone(),
            relationship_type,
            strength: strength.clamp(0.0, 1.0),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Derives a stable entity id from type and case-folded name.
#[must_use]
pub fn entity_id(entity_type: EntityType, name: &str) -> String {
    let key = format!("{}:{}", entity_type.as_str(), name.to_lowercase());
    format!("ent_{}", short_hash(&key))
}

fn short_hash(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_is_case_insensitive() {
        assert_eq!(
            entity_id(EntityType::Technology, "Rust"),
            entity_id(EntityType::Technology, "rust")
        );
        assert_ne!(
            entity_id(EntityType::Technology, "Rust"),
            entity_id(EntityType::Concept, "Rust")
        );
    }

    #[test]
    fn test_entity_confidence_clamped() {
        let entity = Entity::new("Rust", EntityType::Technology, 1.7, "query", Span::new(0, 4));
        assert!((entity.confidence - 1.0).abs() < f32::EPSILON);
        let entity = Entity::new("Rust", EntityType::Technology, -0.2, "query", Span::new(0, 4));
        assert!(entity.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn test_relationship_references_entities() {
        let a = Entity::new("auth.py", EntityType::File, 0.9, "doc", Span::new(0, 7));
        let b = Entity::new("login", EntityType::Function, 0.8, "doc", Span::new(20, 25));
        let rel = Relationship::new(&a, &b, RelationshipType::Contains, 0.7);
        assert_eq!(rel.source_entity_id, a.id);
        assert_eq!(rel.target_entity_id, b.id);
        assert!(rel.id.starts_with("rel_"));
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!(EntityType::parse("exception"), Some(EntityType::ErrorType));
        assert_eq!(EntityType::parse("STRUCT"), Some(EntityType::Class));
        assert_eq!(EntityType::parse("galaxy"), None);
        for ty in EntityType::all() {
            assert_eq!(EntityType::parse(ty.as_str()), Some(*ty));
        }
    }

    #[test]
    fn test_span_distance() {
        assert_eq!(Span::new(10, 12).distance(&Span::new(4, 8)), 6);
    }
}

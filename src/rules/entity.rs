//! Entity extraction rules.

use super::{LazyPattern, compile};
use crate::models::EntityType;
use std::sync::LazyLock;

/// One entity matcher.
pub struct EntityRule {
    /// Rule name, recorded on extracted entities.
    pub name: &'static str,
    /// Type assigned to matches.
    pub entity_type: EntityType,
    /// Compiled pattern; capture group 1 (or the whole match) is the name.
    pub pattern: &'static LazyPattern,
}

impl std::fmt::Debug for EntityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRule")
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .finish_non_exhaustive()
    }
}

macro_rules! entity_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyPattern = LazyLock::new(|| compile(stringify!($name), $regex_str));
    };
}

entity_pattern!(
    RE_TECHNOLOGY,
    r"(?i)\b(python|rust|javascript|typescript|java|golang|kotlin|swift|react|vue|angular|django|flask|fastapi|express|node\.js|postgresql|postgres|mysql|sqlite|mongodb|redis|kafka|rabbitmq|docker|kubernetes|terraform|aws|gcp|azure|graphql|grpc|tokio|serde|numpy|pandas|pytorch|tensorflow|nginx|git|linux)\b"
);
entity_pattern!(
    RE_FUNCTION_DEF,
    r"\b(?:def|fn|function|func)\s+([A-Za-z_][A-Za-z0-9_]*)"
);
entity_pattern!(RE_FUNCTION_CALL, r"\b([a-z_][A-Za-z0-9_]{2,})\(");
entity_pattern!(
    RE_CLASS,
    r"\b(?:class|struct|interface|trait|enum|impl)\s+([A-Z][A-Za-z0-9_]*)"
);
entity_pattern!(
    RE_FILE,
    r"\b([A-Za-z0-9_\-/]+\.(?:py|rs|js|ts|tsx|jsx|go|java|rb|cpp|cc|c|h|hpp|cs|php|toml|json|yaml|yml|sql|md))\b"
);
entity_pattern!(
    RE_ERROR_TYPE,
    r"\b([A-Z][A-Za-z0-9]*(?:Error|Exception|Panic|Fault))\b"
);
entity_pattern!(
    RE_CONCEPT,
    r"(?i)\b(authentication|authorization|caching|database|concurrency|recursion|encryption|logging|validation|serialization|pagination|rate limiting|error handling|dependency injection|circuit breaker|retry|memory leak|race condition|deadlock|migration)\b"
);
entity_pattern!(
    RE_IDENTIFIER,
    r"\b([a-z][a-z0-9]*(?:_[a-z0-9]+)+|[a-z][a-z0-9]*(?:[A-Z][a-z0-9]+)+)\b"
);

static ENTITY_RULES: [EntityRule; 8] = [
    EntityRule {
        name: "technology",
        entity_type: EntityType::Technology,
        pattern: &RE_TECHNOLOGY,
    },
    EntityRule {
        name: "function_definition",
        entity_type: EntityType::Function,
        pattern: &RE_FUNCTION_DEF,
    },
    EntityRule {
        name: "function_call",
        entity_type: EntityType::Function,
        pattern: &RE_FUNCTION_CALL,
    },
    EntityRule {
        name: "class",
        entity_type: EntityType::Class,
        pattern: &RE_CLASS,
    },
    EntityRule {
        name: "file",
        entity_type: EntityType::File,
        pattern: &RE_FILE,
    },
    EntityRule {
        name: "error_type",
        entity_type: EntityType::ErrorType,
        pattern: &RE_ERROR_TYPE,
    },
    EntityRule {
        name: "concept",
        entity_type: EntityType::Concept,
        pattern: &RE_CONCEPT,
    },
    EntityRule {
        name: "identifier",
        entity_type: EntityType::Identifier,
        pattern: &RE_IDENTIFIER,
    },
];

/// Returns every entity rule, most specific first.
#[must_use]
pub fn entity_rules() -> &'static [EntityRule] {
    &ENTITY_RULES
}

/// Confidence boost for an entity type.
#[must_use]
pub const fn type_boost(entity_type: EntityType) -> f32 {
    match entity_type {
        EntityType::Technology | EntityType::File => 0.2,
        EntityType::Function | EntityType::Class | EntityType::ErrorType => 0.15,
        EntityType::Identifier => 0.05,
        EntityType::Concept => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_capture(rule: &str, text: &str) -> Option<String> {
        let rule = entity_rules().iter().find(|r| r.name == rule)?;
        let regex = rule.pattern.as_ref()?;
        regex
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    #[test]
    fn test_every_rule_compiles() {
        for rule in entity_rules() {
            assert!(rule.pattern.is_some(), "rule {} failed to compile", rule.name);
        }
    }

    #[test]
    fn test_rule_matches() {
        assert_eq!(first_capture("file", "see auth.py").as_deref(), Some("auth.py"));
        assert_eq!(
            first_capture("function_definition", "def login(user):").as_deref(),
            Some("login")
        );
        assert_eq!(
            first_capture("class", "class SessionStore:").as_deref(),
            Some("SessionStore")
        );
        assert_eq!(
            first_capture("error_type", "raised ValueError here").as_deref(),
            Some("ValueError")
        );
        assert_eq!(
            first_capture("identifier", "call parse_token now").as_deref(),
            Some("parse_token")
        );
    }
}

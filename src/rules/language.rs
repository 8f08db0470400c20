//! Language keyword tables.

/// Keywords characteristic of one language.
#[derive(Debug, Clone, Copy)]
pub struct LanguageProfile {
    /// Language name.
    pub name: &'static str,
    /// Keywords counted toward density.
    pub keywords: &'static [&'static str],
}

const PROFILES: &[LanguageProfile] = &[
    LanguageProfile {
        name: "python",
        keywords: &[
            "def", "self", "elif", "import", "None", "True", "False", "lambda", "pass", "except",
            "__init__", "yield", "raise", "with", "as",
        ],
    },
    LanguageProfile {
        name: "rust",
        keywords: &[
            "fn", "let", "mut", "impl", "pub", "struct", "enum", "match", "crate", "use", "trait",
            "Self", "mod", "Ok", "Err", "Some",
        ],
    },
    LanguageProfile {
        name: "javascript",
        keywords: &[
            "function", "const", "let", "var", "async", "await", "require", "exports", "console",
            "undefined", "this", "prototype", "null",
        ],
    },
    LanguageProfile {
        name: "typescript",
        keywords: &[
            "interface", "type", "readonly", "implements", "number", "string", "boolean",
            "export", "const", "private", "public", "enum",
        ],
    },
    LanguageProfile {
        name: "go",
        keywords: &[
            "func", "package", "go", "chan", "defer", "struct", "interface", "nil", "fmt", "err",
            "range",
        ],
    },
    LanguageProfile {
        name: "java",
        keywords: &[
            "public", "private", "protected", "class", "static", "void", "extends", "implements",
            "new", "final", "throws", "import", "this",
        ],
    },
];

/// Minimum keyword density for a detection.
const MIN_DENSITY: f32 = 0.02;
/// Minimum distinct keyword hits for a detection.
const MIN_HITS: usize = 2;

/// Returns every language profile.
#[must_use]
pub fn language_profiles() -> &'static [LanguageProfile] {
    PROFILES
}

/// Detects the dominant language by keyword density.
///
/// Returns the language and its density (keyword tokens / all tokens). Ties
/// go to the earlier profile.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn detect_language(code: &str) -> Option<(&'static str, f32)> {
    let tokens: Vec<&str> = code
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&'static str, f32)> = None;
    for profile in PROFILES {
        let hits = tokens
            .iter()
            .filter(|token| profile.keywords.contains(*token))
            .count();
        let distinct = profile
            .keywords
            .iter()
            .filter(|keyword| tokens.contains(*keyword))
            .count();
        if distinct < MIN_HITS {
            continue;
        }
        let density = hits as f32 / tokens.len() as f32;
        if density >= MIN_DENSITY && best.is_none_or(|(_, current)| density > current) {
            best = Some((profile.name, density));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_python() {
        let code = "def login(self, user):\n    if user is None:\n        raise ValueError()\n    return True";
        assert_eq!(detect_language(code).map(|(name, _)| name), Some("python"));
    }

    #[test]
    fn test_detects_rust() {
        let code = "pub fn parse(input: &str) -> Result<Self> {\n    let mut out = Vec::new();\n    match input { _ => Ok(out) }\n}";
        assert_eq!(detect_language(code).map(|(name, _)| name), Some("rust"));
    }

    #[test]
    fn test_prose_is_undetected() {
        assert!(detect_language("the quick brown fox jumps over the lazy dog").is_none());
        assert!(detect_language("").is_none());
    }
}

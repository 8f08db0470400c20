//! Router keyword sets.

/// A named keyword set.
#[derive(Debug, Clone, Copy)]
pub struct TermSet {
    /// Category name.
    pub name: &'static str,
    /// Lowercase single-word terms.
    pub terms: &'static [&'static str],
}

impl TermSet {
    /// Returns the terms present in `tokens`, in table order.
    #[must_use]
    pub fn matched(&self, tokens: &[String]) -> Vec<&'static str> {
        self.terms
            .iter()
            .copied()
            .filter(|term| tokens.iter().any(|token| token == term))
            .collect()
    }
}

/// Code-related terms.
pub const CODE_TERMS: TermSet = TermSet {
    name: "code",
    terms: &[
        "code", "function", "class", "method", "implementation", "implement", "refactor",
        "compile", "syntax", "module", "variable", "struct", "trait", "interface", "snippet",
        "algorithm", "codebase",
    ],
};

/// Search terms.
pub const SEARCH_TERMS: TermSet = TermSet {
    name: "search",
    terms: &[
        "search", "find", "lookup", "locate", "retrieve", "similar", "discover", "fetch", "show",
    ],
};

/// Error and bug terms.
pub const ERROR_TERMS: TermSet = TermSet {
    name: "error",
    terms: &[
        "error", "errors", "bug", "bugs", "exception", "crash", "fail", "failure", "failing",
        "broken", "traceback", "stacktrace", "panic", "debug", "fix",
    ],
};

/// Memory and recall terms.
pub const MEMORY_TERMS: TermSet = TermSet {
    name: "memory",
    terms: &[
        "memory", "memories", "remember", "recall", "previous", "previously", "history",
        "earlier", "past", "forgot", "decided",
    ],
};

/// Keyword sets in classification order.
pub const ROUTING_TERM_SETS: [TermSet; 4] = [CODE_TERMS, SEARCH_TERMS, ERROR_TERMS, MEMORY_TERMS];

/// Names of the keyword sets with at least one term in `tokens`, in
/// classification order.
#[must_use]
pub fn matched_categories(tokens: &[String]) -> Vec<&'static str> {
    ROUTING_TERM_SETS
        .iter()
        .filter(|set| !set.matched(tokens).is_empty())
        .map(|set| set.name)
        .collect()
}

/// Source file extensions that mark a query as code-related.
pub const CODE_EXTENSIONS: &[&str] = &[
    ".py", ".rs", ".js", ".ts", ".tsx", ".jsx", ".go", ".java", ".rb", ".cpp", ".cc", ".c",
    ".h", ".hpp", ".cs", ".php", ".kt", ".swift",
];

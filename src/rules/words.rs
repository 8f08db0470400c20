//! Stop words and common words.

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "how", "if", "in", "into", "is", "it", "its", "just", "me", "my", "not", "of", "on",
    "or", "our", "should", "so", "some", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "to", "too", "use", "used", "using", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "why", "will", "with", "would", "you",
    "your",
];

/// Words that look like identifiers but carry little meaning on their own.
const COMMON_WORDS: &[&str] = &[
    "args", "check", "code", "config", "data", "error", "file", "get", "handle", "helper",
    "info", "init", "item", "items", "key", "list", "main", "name", "new", "obj", "object",
    "result", "run", "self", "set", "start", "test", "thing", "tmp", "type", "update", "user",
    "util", "utils", "val", "value", "values",
];

/// Returns whether a lowercase token is a stop word.
#[must_use]
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Returns whether a name is a common word (case-insensitive).
#[must_use]
pub fn is_common_word(name: &str) -> bool {
    let lower = name.to_lowercase();
    COMMON_WORDS.binary_search(&lower.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_sorted() {
        assert!(STOP_WORDS.windows(2).all(|w| w[0] < w[1]));
        assert!(COMMON_WORDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_lookups() {
        assert!(is_stop_word("the"));
        assert!(!is_stop_word("cache"));
        assert!(is_common_word("Data"));
        assert!(!is_common_word("tokio"));
    }
}

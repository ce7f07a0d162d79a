//! Line predicates: substring and regex

use regex::Regex;

/// Decides whether one line of artifact content matches
pub trait LinePredicate: Send + Sync {
    /// True if the line matches
    fn is_match(&self, line: &str) -> bool;

    /// Stable identity of the predicate, used in cache keys
    fn cache_key(&self) -> String;
}

/// Matches lines containing a fixed string
#[derive(Debug, Clone)]
pub struct SubstringPredicate {
    needle: String,
}

impl SubstringPredicate {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl LinePredicate for SubstringPredicate {
    fn is_match(&self, line: &str) -> bool {
        line.contains(&self.needle)
    }

    fn cache_key(&self) -> String {
        format!("stringLineMatcher: {}", self.needle)
    }
}

/// Matches lines against a compiled regex
#[derive(Debug, Clone)]
pub struct RegexPredicate {
    pattern: Regex,
}

impl RegexPredicate {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl LinePredicate for RegexPredicate {
    fn is_match(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    fn cache_key(&self) -> String {
        format!("regexLineMatcher: {}", self.pattern.as_str())
    }
}

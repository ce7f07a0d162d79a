//! Matched-content types produced by the line matcher

use serde::{Deserialize, Serialize};

/// Content matched inside one artifact
///
/// Empty when the artifact was not scanned or nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_matches: Option<ContentLineMatches>,
}

impl MatchedContent {
    /// Wrap a set of line matches
    pub fn from_lines(line_matches: ContentLineMatches) -> Self {
        Self {
            line_matches: Some(line_matches),
        }
    }

    /// True if there is no matched content at all
    pub fn is_empty(&self) -> bool {
        self.line_matches
            .as_ref()
            .map(|m| m.matches.is_empty())
            .unwrap_or(true)
    }
}

/// Ordered line matches from one artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLineMatches {
    pub matches: Vec<ContentLineMatch>,
    /// More lines matched than are listed
    pub truncated: bool,
}

/// A single matching line with its surrounding context
///
/// Lines keep their trailing newline as read from the artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLineMatch {
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(rename = "match")]
    pub line: String,
    #[serde(default)]
    pub after: Vec<String>,
}

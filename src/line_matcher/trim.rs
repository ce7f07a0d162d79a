//! Trim stage: cut captured matches down to the requested window

use super::matches::{ContentLineMatch, ContentLineMatches};

/// Trim captured matches to the requested limits
///
/// Keeps the first `max_matches` matches (flagging truncation if any were
/// dropped), the last `context_before` lines before each match and the
/// first `context_after` lines after it.
pub fn trim_matches(
    captured: &ContentLineMatches,
    context_before: usize,
    context_after: usize,
    max_matches: usize,
) -> ContentLineMatches {
    let truncated = captured.truncated || captured.matches.len() > max_matches;

    let matches = captured
        .matches
        .iter()
        .take(max_matches)
        .map(|m| {
            let skip = m.before.len().saturating_sub(context_before);
            ContentLineMatch {
                before: m.before[skip..].to_vec(),
                line: m.line.clone(),
                after: m.after.iter().take(context_after).cloned().collect(),
            }
        })
        .collect();

    ContentLineMatches { matches, truncated }
}

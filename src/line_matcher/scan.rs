//! Scan stage: single pass over a line stream with generous context capture

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};
use std::sync::Arc;

use regex::Regex;

use super::matches::{ContentLineMatch, ContentLineMatches, MatchedContent};
use super::predicate::{LinePredicate, RegexPredicate, SubstringPredicate};
use super::trim::trim_matches;
use super::Result;
use crate::constants::{DEFAULT_MAX_LINE_BYTES, MAX_FILE_MATCHES};

/// Line-oriented content matcher
///
/// Scanning always captures up to [`MAX_FILE_MATCHES`] matches with that
/// many lines of context on each side, independent of the requested
/// limits. [`LineMatcher::trim`] then cuts the captured result down to
/// what was requested. Captured results can be cached and re-trimmed for
/// different limits without rescanning.
#[derive(Clone)]
pub struct LineMatcher {
    predicate: Arc<dyn LinePredicate>,
    context_before: usize,
    context_after: usize,
    max_file_matches: usize,
    max_line_bytes: usize,
}

impl std::fmt::Debug for LineMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineMatcher")
            .field("predicate", &self.predicate.cache_key())
            .field("context_before", &self.context_before)
            .field("context_after", &self.context_after)
            .field("max_file_matches", &self.max_file_matches)
            .finish()
    }
}

impl LineMatcher {
    /// Create a matcher from any predicate
    ///
    /// Limits above the capture cap are clamped to it; a zero
    /// `max_file_matches` means the default cap.
    pub fn new(
        predicate: Arc<dyn LinePredicate>,
        context_before: usize,
        context_after: usize,
        max_file_matches: usize,
    ) -> Self {
        let max_file_matches = match max_file_matches {
            0 => MAX_FILE_MATCHES,
            n => n.min(MAX_FILE_MATCHES),
        };
        Self {
            predicate,
            context_before: context_before.min(MAX_FILE_MATCHES),
            context_after: context_after.min(MAX_FILE_MATCHES),
            max_file_matches,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Match lines containing `needle`
    pub fn substring(
        needle: impl Into<String>,
        context_before: usize,
        context_after: usize,
        max_file_matches: usize,
    ) -> Self {
        Self::new(
            Arc::new(SubstringPredicate::new(needle)),
            context_before,
            context_after,
            max_file_matches,
        )
    }

    /// Match lines against `pattern`
    pub fn regex(
        pattern: Regex,
        context_before: usize,
        context_after: usize,
        max_file_matches: usize,
    ) -> Self {
        Self::new(
            Arc::new(RegexPredicate::new(pattern)),
            context_before,
            context_after,
            max_file_matches,
        )
    }

    /// Override the longest line handed to the predicate
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    pub fn context_before(&self) -> usize {
        self.context_before
    }

    pub fn context_after(&self) -> usize {
        self.context_after
    }

    pub fn max_file_matches(&self) -> usize {
        self.max_file_matches
    }

    /// Cache identity; limits are excluded since the capture is limit-free
    pub fn cache_key(&self) -> String {
        self.predicate.cache_key()
    }

    /// Scan a line stream, capturing matches up to the capture cap
    ///
    /// Returns an empty [`MatchedContent`] when nothing matched. A read
    /// error other than end-of-stream aborts the scan.
    pub fn scan<R: BufRead>(&self, mut reader: R) -> Result<MatchedContent> {
        let cap = MAX_FILE_MATCHES;
        let mut matches: Vec<ContentLineMatch> = Vec::with_capacity(cap);
        let mut truncated = false;
        // last lines seen, oldest first
        let mut window: VecDeque<String> = VecDeque::with_capacity(cap + 1);
        // indices of matches still collecting "after" context, oldest first
        let mut pending: VecDeque<usize> = VecDeque::new();
        let mut buf = Vec::with_capacity(256);

        while !truncated || !pending.is_empty() {
            buf.clear();
            if read_line_segment(&mut reader, &mut buf, self.max_line_bytes)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf).into_owned();

            for &idx in &pending {
                matches[idx].after.push(line.clone());
            }
            if let Some(&oldest) = pending.front() {
                if matches[oldest].after.len() >= cap {
                    pending.pop_front();
                }
            }

            if self.predicate.is_match(&line) {
                if matches.len() >= cap {
                    truncated = true;
                    continue;
                }
                matches.push(ContentLineMatch {
                    before: window.iter().cloned().collect(),
                    line: line.clone(),
                    after: Vec::new(),
                });
                pending.push_back(matches.len() - 1);
            }

            window.push_back(line);
            if window.len() > cap {
                window.pop_front();
            }
        }

        if matches.is_empty() {
            return Ok(MatchedContent::default());
        }
        Ok(MatchedContent::from_lines(ContentLineMatches {
            matches,
            truncated,
        }))
    }

    /// Trim captured matches down to the requested limits
    pub fn trim(&self, captured: &ContentLineMatches) -> ContentLineMatches {
        trim_matches(
            captured,
            self.context_before,
            self.context_after,
            self.max_file_matches,
        )
    }

    /// Trim matched content; empty content stays empty
    pub fn trim_content(&self, content: &MatchedContent) -> MatchedContent {
        match &content.line_matches {
            Some(captured) => MatchedContent::from_lines(self.trim(captured)),
            None => MatchedContent::default(),
        }
    }
}

/// Read up to the next newline, stopping after about `limit` bytes
///
/// Overlong lines come back in several pieces. A piece cut inside a UTF-8
/// sequence reads up to 3 extra bytes to finish the character.
fn read_line_segment<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
    let mut n = reader.by_ref().take(limit as u64).read_until(b'\n', buf)?;
    if n == limit && buf.last() != Some(&b'\n') {
        let missing = missing_utf8_bytes(buf);
        if missing > 0 {
            n += reader.by_ref().take(missing as u64).read_until(b'\n', buf)?;
        }
    }
    Ok(n)
}

/// Bytes still needed to complete a UTF-8 sequence cut off at the end of `buf`
fn missing_utf8_bytes(buf: &[u8]) -> usize {
    let tail = &buf[buf.len().saturating_sub(3)..];
    for (i, &b) in tail.iter().enumerate().rev() {
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width: usize = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return width.saturating_sub(tail.len() - i);
    }
    0
}

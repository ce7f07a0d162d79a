//! Line matcher: context-window scanning of artifact content
//!
//! Works in two stages:
//! - `scan` reads a line stream once and captures matches with generous
//!   context (up to the capture cap on every side)
//! - `trim` cuts the captured matches down to the requested window
//!
//! The scanner cannot know while reading a line whether a later match will
//! still need it as context, so capture is generous and trimming is exact.

mod matches;
mod predicate;
mod scan;
mod trim;

pub use matches::{ContentLineMatch, ContentLineMatches, MatchedContent};
pub use predicate::{LinePredicate, RegexPredicate, SubstringPredicate};
pub use scan::LineMatcher;
pub use trim::trim_matches;

/// Errors raised while scanning content
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{0}")]
    Read(#[from] std::io::Error),
}

/// Result type for scan operations
pub type Result<T> = std::result::Result<T, ScanError>;

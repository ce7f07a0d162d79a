//! Stores: the engine's external collaborators
//!
//! - `RecordStore` resolves a job-run id to its recorded URL and job name
//! - `ArtifactStore` lists and opens artifact objects
//!
//! Both are shared read-only by every worker, so implementations must be
//! `Send + Sync`.

mod fs;
mod memory;
mod sqlite;

pub use fs::FsArtifactStore;
pub use memory::{MemoryArtifactStore, MemoryRecordStore};
pub use sqlite::SqliteRecordStore;

use std::io::{BufRead, BufReader, Read};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::GZIP_CONTENT_TYPE;

/// Job-run row as recorded by the CI ingestion side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunRecord {
    pub id: i64,
    /// External job-run URL (contains the bucket root)
    pub url: String,
    pub job_name: String,
}

/// Attributes of one stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttrs {
    /// Full object name within the bucket
    pub name: String,
    pub content_type: Option<String>,
}

impl ObjectAttrs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
        }
    }

    pub fn is_gzip(&self) -> bool {
        self.content_type.as_deref() == Some(GZIP_CONTENT_TYPE)
    }
}

/// Errors from record lookups
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("job run {0} not found")]
    NotFound(i64),

    #[error("record store error: {0}")]
    Backend(String),
}

/// Errors from artifact storage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("invalid object name: {0}")]
    InvalidName(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Backend(String),
}

/// Buffered reader over an object's (decompressed) content
pub type ArtifactReader = Box<dyn BufRead + Send>;

/// Job-run metadata lookup
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn job_run(&self, id: i64) -> Result<JobRunRecord, RecordError>;
}

/// Object listing and reading
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// List at most `limit` objects whose names start with `prefix`
    ///
    /// `match_glob` is applied to full object names. Results are in
    /// ascending name order.
    async fn list_objects(
        &self,
        prefix: &str,
        match_glob: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObjectAttrs>, StorageError>;

    /// Open an object for line-oriented reading
    async fn open_object(&self, attrs: &ObjectAttrs) -> Result<ArtifactReader, StorageError>;
}

/// Compile a listing glob
///
/// `*` and `?` never cross a `/`; `**` spans directories.
pub(crate) fn compile_glob(pattern: &str) -> Result<Pattern, StorageError> {
    Pattern::new(pattern).map_err(|e| StorageError::InvalidGlob {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn glob_matches(pattern: &Pattern, name: &str) -> bool {
    pattern.matches_with(
        name,
        MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        },
    )
}

/// Wrap raw object bytes in a buffered reader, decompressing gzip content
pub(crate) fn content_reader<R>(raw: R, attrs: &ObjectAttrs) -> ArtifactReader
where
    R: Read + Send + 'static,
{
    if attrs.is_gzip() {
        Box::new(BufReader::new(GzDecoder::new(raw)))
    } else {
        Box::new(BufReader::new(raw))
    }
}

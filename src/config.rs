//! Engine configuration
//!
//! Pool sizes, deadlines and listing limits for the query engine. Loaded
//! from TOML; any field left out keeps its default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::constants::{
    DEFAULT_ARTIFACT_TIMEOUT_MS, DEFAULT_ARTIFACT_URL_BASE, DEFAULT_ARTIFACT_WORKERS,
    DEFAULT_BUCKET_ROOT, DEFAULT_CACHE_TTL_SECS, DEFAULT_JOB_RUN_TIMEOUT_MS,
    DEFAULT_JOB_RUN_WORKERS, DEFAULT_MAX_JOB_FILES, DEFAULT_MAX_LINE_BYTES,
};

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Query engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Job-run worker pool size
    pub job_run_workers: usize,

    /// Artifact worker pool size
    pub artifact_workers: usize,

    /// Deadline for one top-level query, in milliseconds
    pub job_run_timeout_ms: u64,

    /// Deadline for artifact scans, in milliseconds (must be shorter)
    pub artifact_timeout_ms: u64,

    /// Artifact files inspected per job run
    pub max_job_files: usize,

    /// Longest line handed to a predicate before it is split
    pub max_line_bytes: usize,

    /// Bucket root marker expected in every job-run URL
    pub bucket_root: String,

    /// Prefix of browsable artifact URLs
    pub artifact_url_base: String,

    /// Result cache entry lifetime, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            job_run_workers: DEFAULT_JOB_RUN_WORKERS,
            artifact_workers: DEFAULT_ARTIFACT_WORKERS,
            job_run_timeout_ms: DEFAULT_JOB_RUN_TIMEOUT_MS, // 30 seconds
            artifact_timeout_ms: DEFAULT_ARTIFACT_TIMEOUT_MS, // 28 seconds
            max_job_files: DEFAULT_MAX_JOB_FILES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            bucket_root: DEFAULT_BUCKET_ROOT.to_string(),
            artifact_url_base: DEFAULT_ARTIFACT_URL_BASE.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS, // 4 hours
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading engine config");
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check limits and deadline ordering
    pub fn validate(&self) -> Result<()> {
        if self.job_run_workers == 0 {
            return Err(ConfigError::Invalid("job_run_workers must be > 0".into()));
        }
        if self.artifact_workers == 0 {
            return Err(ConfigError::Invalid("artifact_workers must be > 0".into()));
        }
        if self.max_job_files == 0 {
            return Err(ConfigError::Invalid("max_job_files must be > 0".into()));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Invalid("max_line_bytes must be > 0".into()));
        }
        if self.artifact_timeout_ms == 0 {
            return Err(ConfigError::Invalid("artifact_timeout_ms must be > 0".into()));
        }
        if self.artifact_timeout_ms >= self.job_run_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "artifact_timeout_ms ({}) must be shorter than job_run_timeout_ms ({})",
                self.artifact_timeout_ms, self.job_run_timeout_ms
            )));
        }
        if self.bucket_root.is_empty() || self.bucket_root.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "bucket_root {:?} must be a single non-empty path segment",
                self.bucket_root
            )));
        }
        Ok(())
    }

    pub fn job_run_timeout(&self) -> Duration {
        Duration::from_millis(self.job_run_timeout_ms)
    }

    pub fn artifact_timeout(&self) -> Duration {
        Duration::from_millis(self.artifact_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

//! Artifact resolver: job run → storage prefix → candidate files

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::types::JobRun;
use crate::stores::{ArtifactStore, ObjectAttrs, RecordError, RecordStore, StorageError};

/// Errors that end processing of one job run
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("record for job run {0} has no URL")]
    MissingUrl(i64),

    #[error("job run {id} URL {url} does not include bucket root {root:?}")]
    MissingBucketRoot { id: i64, url: String, root: String },

    #[error(transparent)]
    Listing(#[from] StorageError),
}

/// Candidate files found under one job run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRunFiles {
    pub files: Vec<ObjectAttrs>,
    /// More files existed than were kept
    pub truncated: bool,
}

/// Resolves job runs to storage prefixes and lists their artifacts
#[derive(Clone)]
pub struct ArtifactResolver {
    records: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    bucket_root: String,
    max_job_files: usize,
}

impl ArtifactResolver {
    pub fn new(
        records: Arc<dyn RecordStore>,
        artifacts: Arc<dyn ArtifactStore>,
        bucket_root: impl Into<String>,
        max_job_files: usize,
    ) -> Self {
        Self {
            records,
            artifacts,
            bucket_root: bucket_root.into(),
            max_job_files,
        }
    }

    /// Look up a job run and derive its storage prefix
    ///
    /// The returned job run has no artifacts yet.
    pub async fn resolve_job_run(&self, job_run_id: i64) -> Result<JobRun, ResolveError> {
        let record = self.records.job_run(job_run_id).await?;
        let bucket_path = bucket_path_for(job_run_id, &record.url, &self.bucket_root)?;
        debug!(job_run_id, bucket_path = %bucket_path, "resolved job run");

        Ok(JobRun {
            id: job_run_id.to_string(),
            url: record.url,
            job_name: record.job_name,
            bucket_path,
            // even failures are final; only timeouts leave room for a re-query
            is_final: true,
            ..Default::default()
        })
    }

    /// List candidate files under a job run's prefix
    ///
    /// Keeps at most `max_job_files` names and flags truncation when more
    /// exist; never paginates past that.
    pub async fn list_job_run_files(
        &self,
        bucket_path: &str,
        path_glob: Option<&str>,
    ) -> Result<JobRunFiles, ResolveError> {
        let match_glob = path_glob.map(|glob| format!("{}{}", bucket_path, glob));
        let mut files = self
            .artifacts
            .list_objects(bucket_path, match_glob.as_deref(), self.max_job_files + 1)
            .await?;

        let truncated = files.len() > self.max_job_files;
        files.truncate(self.max_job_files);
        debug!(
            bucket_path = %bucket_path,
            files = files.len(),
            truncated,
            "listed job run files"
        );
        Ok(JobRunFiles { files, truncated })
    }
}

/// Storage prefix of a job run: the URL remainder after `/<root>/`
///
/// Always ends in `/` so it behaves as an object prefix.
pub fn bucket_path_for(job_run_id: i64, url: &str, bucket_root: &str) -> Result<String, ResolveError> {
    if url.is_empty() {
        return Err(ResolveError::MissingUrl(job_run_id));
    }
    let marker = format!("/{}/", bucket_root);
    let start = url
        .find(&marker)
        .ok_or_else(|| ResolveError::MissingBucketRoot {
            id: job_run_id,
            url: url.to_string(),
            root: bucket_root.to_string(),
        })?;

    let mut path = url[start + marker.len()..].to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    Ok(path)
}

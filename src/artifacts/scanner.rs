//! Artifact scanner: read one artifact and match its lines

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::types::JobRunArtifact;
use crate::line_matcher::LineMatcher;
use crate::stores::{ArtifactStore, ObjectAttrs};

/// Scans artifact content for one query's matcher
///
/// Failures are recorded on the returned artifact, never raised: one
/// file's failure must not abort its siblings.
#[derive(Clone)]
pub struct ArtifactScanner {
    artifacts: Arc<dyn ArtifactStore>,
    bucket_root: String,
    artifact_url_base: String,
    max_line_bytes: usize,
}

impl ArtifactScanner {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        bucket_root: impl Into<String>,
        artifact_url_base: impl Into<String>,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            artifacts,
            bucket_root: bucket_root.into(),
            artifact_url_base: artifact_url_base.into(),
            max_line_bytes,
        }
    }

    /// Browsable URL for an object
    pub fn artifact_url(&self, object_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.artifact_url_base.trim_end_matches('/'),
            self.bucket_root,
            object_name
        )
    }

    /// Artifact entry with naming filled in and no content
    pub fn bare_artifact(&self, job_run_id: i64, attrs: &ObjectAttrs) -> JobRunArtifact {
        let job_run_id = job_run_id.to_string();
        JobRunArtifact {
            artifact_path: relative_artifact_path(&attrs.name, &job_run_id),
            artifact_url: self.artifact_url(&attrs.name),
            artifact_content_type: attrs.content_type.clone(),
            job_run_id,
            ..Default::default()
        }
    }

    /// Entry for an artifact that never answered before its deadline
    pub fn timed_out_artifact(&self, job_run_id: i64, attrs: &ObjectAttrs, timeout: Duration) -> JobRunArtifact {
        JobRunArtifact {
            error: Some(format!("request did not complete within {:?}", timeout)),
            timed_out: true,
            ..self.bare_artifact(job_run_id, attrs)
        }
    }

    /// Scan one artifact
    ///
    /// Without a matcher the content is not read at all. Returns the full
    /// captured matches; trimming to the requested window happens later.
    pub async fn scan(
        &self,
        job_run_id: i64,
        attrs: &ObjectAttrs,
        matcher: Option<&LineMatcher>,
    ) -> JobRunArtifact {
        let mut artifact = self.bare_artifact(job_run_id, attrs);
        let Some(matcher) = matcher else {
            return artifact;
        };

        let reader = match self.artifacts.open_object(attrs).await {
            Ok(reader) => reader,
            Err(e) => {
                warn!(job_run_id, artifact = %attrs.name, error = %e, "failed to open artifact");
                artifact.error = Some(e.to_string());
                return artifact;
            }
        };

        let matcher = matcher.clone().with_max_line_bytes(self.max_line_bytes);
        match tokio::task::spawn_blocking(move || matcher.scan(reader)).await {
            Ok(Ok(content)) => {
                debug!(
                    job_run_id,
                    artifact = %attrs.name,
                    matched = !content.is_empty(),
                    "scanned artifact"
                );
                artifact.matched_content = content;
            }
            Ok(Err(e)) => {
                warn!(job_run_id, artifact = %attrs.name, error = %e, "failed to scan artifact");
                artifact.error = Some(e.to_string());
            }
            Err(e) => {
                error!(job_run_id, artifact = %attrs.name, error = %e, "artifact scan task failed");
                artifact.error = Some(format!("scan task failed: {}", e));
            }
        }
        artifact
    }
}

/// Object name reduced to the part below `/<job_run_id>/`
///
/// A name without that segment is returned whole.
pub fn relative_artifact_path(object_name: &str, job_run_id: &str) -> String {
    let marker = format!("/{}/", job_run_id);
    match object_name.find(&marker) {
        Some(start) => object_name[start + marker.len()..].to_string(),
        None => {
            error!(
                artifact = %object_name,
                job_run_id = %job_run_id,
                "artifact path does not include job run id"
            );
            object_name.to_string()
        }
    }
}

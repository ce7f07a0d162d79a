//! Query input and response types

use serde::{Deserialize, Serialize};

use crate::line_matcher::{LineMatcher, MatchedContent};

/// One top-level artifact query
///
/// Shared read-only by every worker for the duration of a call.
#[derive(Debug, Clone, Default)]
pub struct JobArtifactQuery {
    /// Job runs to inspect; duplicates are ignored
    pub job_run_ids: Vec<i64>,
    /// Glob relative to each job run's storage prefix
    pub path_glob: Option<String>,
    /// Content matcher; without one, artifacts are listed but not read
    pub content_matcher: Option<LineMatcher>,
}

impl JobArtifactQuery {
    pub fn new(job_run_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            job_run_ids: job_run_ids.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_path_glob(mut self, glob: impl Into<String>) -> Self {
        let glob = glob.into();
        self.path_glob = (!glob.is_empty()).then_some(glob);
        self
    }

    pub fn with_matcher(mut self, matcher: LineMatcher) -> Self {
        self.content_matcher = Some(matcher);
        self
    }
}

/// Top-level response: every requested job run lands in exactly one list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub job_runs: Vec<JobRun>,
    pub errors: Vec<JobRunError>,
}

/// Result for one job run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    /// Decimal id; ids can exceed what JSON numbers represent safely
    pub id: String,
    pub url: String,
    pub job_name: String,
    /// Storage prefix of the job run's artifacts, ending in `/`
    pub bucket_path: String,
    pub artifacts: Vec<JobRunArtifact>,
    pub artifact_list_truncated: bool,
    /// No artifact timed out; a cached copy can be served as-is
    pub is_final: bool,
}

/// Result for one artifact file of a job run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunArtifact {
    pub job_run_id: String,
    /// Path below the job run's own directory
    pub artifact_path: String,
    pub artifact_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_content_type: Option<String>,
    #[serde(default)]
    pub matched_content: MatchedContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub timed_out: bool,
}

/// A job run that failed or did not answer in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunError {
    pub id: String,
    pub error: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

//! Engine-wide constants
//!
//! These limits are fairly arbitrary; they can be raised until the storage
//! backend starts pushing back.

/// Concurrent processors of one job run each
pub const DEFAULT_JOB_RUN_WORKERS: usize = 12;

/// Concurrent processors of one artifact each
pub const DEFAULT_ARTIFACT_WORKERS: usize = 12;

/// Deadline for a whole job-run query, in milliseconds
pub const DEFAULT_JOB_RUN_TIMEOUT_MS: u64 = 30_000;

/// Deadline for artifact scans, in milliseconds
///
/// Shorter than the job-run deadline so scans can return (possibly
/// incomplete) results before the job run gives up.
pub const DEFAULT_ARTIFACT_TIMEOUT_MS: u64 = 28_000;

/// Files inspected under each job run
pub const DEFAULT_MAX_JOB_FILES: usize = 12;

/// Content matches returned for each file, and the scan capture cap
///
/// The scanner always captures up to this many matches and context lines;
/// requested limits only trim the captured result.
pub const MAX_FILE_MATCHES: usize = 12;

/// Longest "line" handed to a predicate; longer lines are split
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Bucket root every job-run URL must contain
pub const DEFAULT_BUCKET_ROOT: &str = "test-platform-results";

/// Prefix for browsable artifact URLs
pub const DEFAULT_ARTIFACT_URL_BASE: &str = "https://gcsweb-ci.apps.ci.l2s4.p1.openshiftapps.com/gcs";

/// Result cache entry lifetime, in seconds (4 hours)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 4 * 60 * 60;

/// Content type of gzip-compressed artifacts
pub const GZIP_CONTENT_TYPE: &str = "application/gzip";

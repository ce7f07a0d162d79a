//! Job-run artifacts: query types, resolution, scanning and caching

pub mod cache;
pub mod resolver;
pub mod scanner;
pub mod types;

pub use cache::{cache_key_for_job_run, CacheError, MemoryCache, ResultCache};
pub use resolver::{bucket_path_for, ArtifactResolver, JobRunFiles, ResolveError};
pub use scanner::{relative_artifact_path, ArtifactScanner};
pub use types::{JobArtifactQuery, JobRun, JobRunArtifact, JobRunError, QueryResponse};

//! jobscan: concurrent artifact search across CI job runs
//!
//! Given a set of job-run ids, resolves each run's artifact prefix through a
//! record store, lists candidate files, and scans their content for matching
//! lines with bounded context. Work is spread over two fixed worker pools
//! owned by a [`Manager`]; every requested job run is answered before the
//! query deadline, either with results or with an error entry.

pub mod artifacts;
pub mod config;
pub mod constants;
pub mod line_matcher;
pub mod manager;
pub mod params;
pub mod stores;

pub use artifacts::{
    JobArtifactQuery, JobRun, JobRunArtifact, JobRunError, MemoryCache, QueryResponse, ResultCache,
};
pub use config::{ConfigError, EngineConfig};
pub use line_matcher::{ContentLineMatch, ContentLineMatches, LineMatcher, MatchedContent};
pub use manager::{Manager, QuerySources};
pub use params::{ParamError, QueryParams};
pub use stores::{
    ArtifactStore, FsArtifactStore, MemoryArtifactStore, MemoryRecordStore, ObjectAttrs,
    RecordStore, SqliteRecordStore,
};

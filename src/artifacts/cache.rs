//! Result cache for per-job-run results
//!
//! Entries hold the untrimmed job run serialized as JSON, keyed by job run
//! id, path glob and matcher. Cache failures never fail a query.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::types::JobRun;
use crate::line_matcher::LineMatcher;

/// Errors from a cache backend
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache entry is not a valid job run: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Key/value cache with per-entry lifetime
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process cache; expired entries are dropped on read
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// Cache key for one job run under one query shape
///
/// JSON with keys in sorted order so equal queries always agree.
pub fn cache_key_for_job_run(job_run_id: i64, path_glob: Option<&str>, matcher: Option<&LineMatcher>) -> String {
    // serde_json's default map is ordered by key
    let mut key = serde_json::Map::new();
    if let Some(matcher) = matcher {
        key.insert("contentMatcher".into(), matcher.cache_key().into());
    }
    key.insert("id".into(), job_run_id.to_string().into());
    key.insert("pathGlob".into(), path_glob.unwrap_or_default().into());
    key.insert("type".into(), "JAQJobRun~v1".into());
    serde_json::Value::Object(key).to_string()
}

/// Fetch a cached job run; any failure reads as a miss
pub async fn get_cached_job_run(cache: &dyn ResultCache, key: &str) -> Option<JobRun> {
    let bytes = match cache.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!(key = %key, error = %e, "result cache read failed");
            return None;
        }
    };
    match serde_json::from_slice::<JobRun>(&bytes) {
        Ok(job_run) => {
            debug!(key = %key, is_final = job_run.is_final, "result cache hit");
            Some(job_run)
        }
        Err(e) => {
            warn!(key = %key, error = %e, "discarding undecodable cache entry");
            None
        }
    }
}

/// Store a job run; failures are logged and dropped
pub async fn set_cached_job_run(cache: &dyn ResultCache, key: &str, job_run: &JobRun, ttl: Duration) {
    let bytes = match serde_json::to_vec(job_run) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key = %key, error = %e, "failed to encode job run for cache");
            return;
        }
    };
    if let Err(e) = cache.set(key, bytes, ttl).await {
        warn!(key = %key, error = %e, "result cache write failed");
    }
}

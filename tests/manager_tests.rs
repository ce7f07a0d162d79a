// Integration tests for the query manager
// In-memory stores; deadlines use short real timeouts

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobscan::stores::{ArtifactReader, JobRunRecord, RecordError, StorageError};
use jobscan::{
    ArtifactStore, EngineConfig, JobArtifactQuery, LineMatcher, Manager, MemoryArtifactStore,
    MemoryCache, MemoryRecordStore, ObjectAttrs, QuerySources, RecordStore,
};
use tokio::time::Instant;

fn run_url(id: i64) -> String {
    format!("https://prow.example/view/gs/test-platform-results/logs/periodic-e2e/{}", id)
}

fn object(id: i64, path: &str) -> String {
    format!("logs/periodic-e2e/{}/{}", id, path)
}

fn config(job_run_timeout_ms: u64, artifact_timeout_ms: u64) -> EngineConfig {
    EngineConfig {
        job_run_workers: 4,
        artifact_workers: 4,
        job_run_timeout_ms,
        artifact_timeout_ms,
        ..Default::default()
    }
}

fn records(ids: &[i64]) -> MemoryRecordStore {
    ids.iter().fold(MemoryRecordStore::new(), |store, &id| {
        store.with_record(id, run_url(id), "periodic-e2e")
    })
}

fn artifacts(ids: &[i64]) -> MemoryArtifactStore {
    ids.iter().fold(MemoryArtifactStore::new(), |store, &id| {
        store
            .with_object(object(id, "build-log.txt"), "starting\nerror: first\nrunning\nerror: second\ndone\n")
            .with_object(object(id, "artifacts/junit.xml"), "<testsuite/>\n")
    })
}

fn manager(config: EngineConfig, records: impl RecordStore + 'static, artifacts: impl ArtifactStore + 'static) -> Manager {
    Manager::new(config, QuerySources::new(Arc::new(records), Arc::new(artifacts))).expect("valid config")
}

/// Record store that never answers for some ids
struct HangingRecords {
    inner: MemoryRecordStore,
    hang: HashSet<i64>,
}

#[async_trait]
impl RecordStore for HangingRecords {
    async fn job_run(&self, id: i64) -> Result<JobRunRecord, RecordError> {
        if self.hang.contains(&id) {
            std::future::pending::<()>().await;
        }
        self.inner.job_run(id).await
    }
}

/// Artifact store with per-object delays and an open counter
struct SlowArtifacts {
    inner: MemoryArtifactStore,
    slow: Mutex<HashSet<String>>,
    delay: Duration,
    opens: AtomicUsize,
}

impl SlowArtifacts {
    fn new(inner: MemoryArtifactStore, slow: &[String], delay: Duration) -> Self {
        Self {
            inner,
            slow: Mutex::new(slow.iter().cloned().collect()),
            delay,
            opens: AtomicUsize::new(0),
        }
    }

    fn make_fast(&self) {
        self.slow.lock().unwrap().clear();
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for SlowArtifacts {
    async fn list_objects(
        &self,
        prefix: &str,
        match_glob: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObjectAttrs>, StorageError> {
        self.inner.list_objects(prefix, match_glob, limit).await
    }

    async fn open_object(&self, attrs: &ObjectAttrs) -> Result<ArtifactReader, StorageError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let slow = self.slow.lock().unwrap().contains(&attrs.name);
        if slow {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.open_object(attrs).await
    }
}

#[tokio::test]
async fn test_every_id_answered_once() {
    let m = manager(config(5_000, 4_000), records(&[1, 2]), artifacts(&[1, 2]));
    let query = JobArtifactQuery::new([2, 1, 3, 2, 1]).with_path_glob("**");

    let response = m.query(query).await;

    let ok: Vec<&str> = response.job_runs.iter().map(|r| r.id.as_str()).collect();
    let failed: Vec<&str> = response.errors.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ok, vec!["1", "2"]);
    assert_eq!(failed, vec!["3"]);
    assert_eq!(response.errors[0].error, "job run 3 not found");
    m.close().await;
}

#[tokio::test]
async fn test_ids_sorted_numerically() {
    let ids = [10, 9, 100];
    let m = manager(config(5_000, 4_000), records(&ids), artifacts(&ids));

    let response = m.query(JobArtifactQuery::new(ids).with_path_glob("*")).await;

    let ok: Vec<&str> = response.job_runs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ok, vec!["9", "10", "100"]);
    m.close().await;
}

#[tokio::test]
async fn test_listing_without_matcher_reads_nothing() {
    let store = Arc::new(SlowArtifacts::new(artifacts(&[1]), &[], Duration::ZERO));
    let sources = QuerySources::new(Arc::new(records(&[1])), store.clone());
    let m = Manager::new(config(5_000, 4_000), sources).unwrap();

    let response = m.query(JobArtifactQuery::new([1]).with_path_glob("**")).await;

    let job_run = &response.job_runs[0];
    assert_eq!(job_run.bucket_path, "logs/periodic-e2e/1/");
    assert_eq!(job_run.job_name, "periodic-e2e");
    let paths: Vec<&str> = job_run.artifacts.iter().map(|a| a.artifact_path.as_str()).collect();
    assert_eq!(paths, vec!["artifacts/junit.xml", "build-log.txt"]);
    assert!(job_run.artifacts.iter().all(|a| a.matched_content.is_empty()));
    assert_eq!(store.opens(), 0);
    m.close().await;
}

#[tokio::test]
async fn test_content_matches_trimmed_to_request() {
    let m = manager(config(5_000, 4_000), records(&[1]), artifacts(&[1]));
    let query = JobArtifactQuery::new([1])
        .with_path_glob("*.txt")
        .with_matcher(LineMatcher::substring("error", 1, 1, 1));

    let response = m.query(query).await;

    let artifact = &response.job_runs[0].artifacts[0];
    assert_eq!(
        artifact.artifact_url,
        "https://gcsweb-ci.apps.ci.l2s4.p1.openshiftapps.com/gcs/test-platform-results/logs/periodic-e2e/1/build-log.txt"
    );
    let matches = artifact.matched_content.line_matches.as_ref().unwrap();
    assert!(matches.truncated);
    assert_eq!(matches.matches.len(), 1);
    assert_eq!(matches.matches[0].before, vec!["starting\n"]);
    assert_eq!(matches.matches[0].line, "error: first\n");
    assert_eq!(matches.matches[0].after, vec!["running\n"]);
    m.close().await;
}

#[tokio::test]
async fn test_file_list_truncation() {
    let mut store = MemoryArtifactStore::new();
    for i in 0..15 {
        store.insert(object(1, &format!("artifacts/file-{:02}.log", i)), "x\n");
    }
    let m = manager(config(5_000, 4_000), records(&[1]), store);

    let response = m.query(JobArtifactQuery::new([1]).with_path_glob("artifacts/*.log")).await;

    let job_run = &response.job_runs[0];
    assert!(job_run.artifact_list_truncated);
    assert_eq!(job_run.artifacts.len(), 12);
    m.close().await;
}

#[tokio::test]
async fn test_resolution_failures_are_per_job_run() {
    let records = records(&[1])
        .with_record(2, "", "no-url")
        .with_record(3, "https://prow.example/view/gs/other-bucket/logs/x/3", "other");
    let m = manager(config(5_000, 4_000), records, artifacts(&[1]));

    let response = m.query(JobArtifactQuery::new([1, 2, 3]).with_path_glob("*")).await;

    assert_eq!(response.job_runs.len(), 1);
    assert_eq!(response.errors[0].error, "record for job run 2 has no URL");
    assert!(response.errors[1].error.contains("does not include bucket root"));
    m.close().await;
}

#[tokio::test]
async fn test_open_failure_stays_on_artifact() {
    let mut store = artifacts(&[1]);
    // a gzip-typed object with plain bytes fails to decode
    store.insert_typed(object(1, "broken.txt.gz"), "not gzip\n", Some("application/gzip"));
    let m = manager(config(5_000, 4_000), records(&[1]), store);
    let query = JobArtifactQuery::new([1])
        .with_path_glob("*.txt*")
        .with_matcher(LineMatcher::substring("error", 0, 0, 0));

    let response = m.query(query).await;

    let job_run = &response.job_runs[0];
    assert_eq!(job_run.artifacts.len(), 2);
    let broken = job_run.artifacts.iter().find(|a| a.artifact_path == "broken.txt.gz").unwrap();
    assert!(broken.error.is_some());
    assert!(!broken.timed_out);
    let log = job_run.artifacts.iter().find(|a| a.artifact_path == "build-log.txt").unwrap();
    assert!(log.error.is_none());
    assert!(!log.matched_content.is_empty());
    assert!(job_run.is_final);
    m.close().await;
}

#[tokio::test]
async fn test_hung_resolution_reported_as_timeout() {
    let hanging = HangingRecords {
        inner: records(&[1, 7]),
        hang: [7].into_iter().collect(),
    };
    let m = manager(config(300, 200), hanging, artifacts(&[1, 7]));

    let started = Instant::now();
    let response = m.query(JobArtifactQuery::new([1, 7]).with_path_glob("*")).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.job_runs.len(), 1);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].id, "7");
    assert_eq!(response.errors[0].error, "request did not complete within 300ms");

    // the abandoned worker must not block shutdown
    tokio::time::timeout(Duration::from_secs(2), m.close())
        .await
        .expect("close should not hang");
}

#[tokio::test]
async fn test_caller_deadline_clips_query() {
    let hanging = HangingRecords {
        inner: records(&[1]),
        hang: [1].into_iter().collect(),
    };
    let m = manager(config(10_000, 9_000), hanging, artifacts(&[1]));

    let started = Instant::now();
    let response = m
        .query_until(JobArtifactQuery::new([1]), Instant::now() + Duration::from_millis(200))
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.errors[0].id, "1");
    assert!(response.errors[0].error.starts_with("request did not complete within"));
    m.close().await;
}

#[tokio::test]
async fn test_distant_caller_deadline_reports_configured_timeout() {
    let hanging = HangingRecords {
        inner: records(&[7]),
        hang: [7].into_iter().collect(),
    };
    let m = manager(config(300, 200), hanging, artifacts(&[7]));

    let response = m
        .query_until(JobArtifactQuery::new([7]), Instant::now() + Duration::from_secs(10))
        .await;

    assert_eq!(response.errors[0].error, "request did not complete within 300ms");
    m.close().await;
}

#[tokio::test]
async fn test_short_caller_deadline_still_scans_artifacts() {
    // caller deadline well inside the gap between the two default timeouts
    let m = manager(EngineConfig::default(), records(&[1]), artifacts(&[1]));
    let query = JobArtifactQuery::new([1])
        .with_path_glob("**")
        .with_matcher(LineMatcher::substring("error", 0, 0, 0));

    let response = m
        .query_until(query, Instant::now() + Duration::from_millis(1500))
        .await;

    assert!(response.errors.is_empty());
    let job_run = &response.job_runs[0];
    assert!(job_run.is_final);
    let log = job_run.artifacts.iter().find(|a| a.artifact_path == "build-log.txt").unwrap();
    assert!(!log.timed_out);
    assert!(log.error.is_none());
    let matches = log.matched_content.line_matches.as_ref().unwrap();
    assert_eq!(matches.matches.len(), 2);
    m.close().await;
}

#[tokio::test]
async fn test_slow_artifact_times_out_alone() {
    let slow_name = object(1, "build-log.txt");
    let store = SlowArtifacts::new(artifacts(&[1]), &[slow_name], Duration::from_secs(5));
    let m = manager(config(800, 400), records(&[1]), store);
    let query = JobArtifactQuery::new([1])
        .with_path_glob("**")
        .with_matcher(LineMatcher::substring("testsuite", 0, 0, 0));

    let response = m.query(query).await;

    let job_run = &response.job_runs[0];
    assert!(!job_run.is_final);
    let log = job_run.artifacts.iter().find(|a| a.artifact_path == "build-log.txt").unwrap();
    assert!(log.timed_out);
    assert_eq!(log.error.as_deref(), Some("request did not complete within 400ms"));
    let junit = job_run.artifacts.iter().find(|a| a.artifact_path == "artifacts/junit.xml").unwrap();
    assert!(!junit.timed_out);
    assert!(!junit.matched_content.is_empty());
    m.close().await;
}

#[tokio::test]
async fn test_cache_requeries_only_timed_out_artifacts() {
    let slow_name = object(1, "build-log.txt");
    let store = Arc::new(SlowArtifacts::new(artifacts(&[1]), &[slow_name], Duration::from_secs(5)));
    let sources = QuerySources::new(Arc::new(records(&[1])), store.clone())
        .with_cache(Arc::new(MemoryCache::new()));
    let m = Manager::new(config(800, 400), sources).unwrap();
    let query = JobArtifactQuery::new([1])
        .with_path_glob("**")
        .with_matcher(LineMatcher::substring("error", 0, 0, 0));

    let first = m.query(query.clone()).await;
    assert!(!first.job_runs[0].is_final);
    assert_eq!(store.opens(), 2);

    store.make_fast();
    let second = m.query(query.clone()).await;
    let job_run = &second.job_runs[0];
    assert!(job_run.is_final);
    assert!(job_run.artifacts.iter().all(|a| !a.timed_out));
    // only the timed-out file was opened again
    assert_eq!(store.opens(), 3);

    let third = m.query(query).await;
    assert_eq!(third, second);
    assert_eq!(store.opens(), 3);
    m.close().await;
}

#[tokio::test]
async fn test_cached_capture_retrimmed_per_query() {
    let sources = QuerySources::new(Arc::new(records(&[1])), Arc::new(artifacts(&[1])))
        .with_cache(Arc::new(MemoryCache::new()));
    let m = Manager::new(config(5_000, 4_000), sources).unwrap();
    let narrow = JobArtifactQuery::new([1])
        .with_path_glob("*.txt")
        .with_matcher(LineMatcher::substring("error", 0, 0, 1));
    let wide = JobArtifactQuery::new([1])
        .with_path_glob("*.txt")
        .with_matcher(LineMatcher::substring("error", 2, 2, 12));

    let first = m.query(narrow).await;
    let second = m.query(wide).await;

    let narrow_matches = first.job_runs[0].artifacts[0].matched_content.line_matches.clone().unwrap();
    let wide_matches = second.job_runs[0].artifacts[0].matched_content.line_matches.clone().unwrap();
    assert_eq!(narrow_matches.matches.len(), 1);
    assert!(narrow_matches.truncated);
    assert_eq!(wide_matches.matches.len(), 2);
    assert!(!wide_matches.truncated);
    assert_eq!(wide_matches.matches[1].before, vec!["error: first\n", "running\n"]);
    m.close().await;
}

#[tokio::test]
async fn test_repeated_queries_identical() {
    let ids = [1, 2, 3, 4, 5];
    let m = manager(config(5_000, 4_000), records(&ids), artifacts(&ids));
    let query = JobArtifactQuery::new(ids)
        .with_path_glob("**")
        .with_matcher(LineMatcher::substring("error", 1, 1, 0));

    let first = m.query(query.clone()).await;
    let second = m.query(query.clone()).await;
    assert_eq!(first, second);

    let files = vec![
        ObjectAttrs::new(object(1, "build-log.txt")),
        ObjectAttrs::new(object(1, "artifacts/junit.xml")),
        ObjectAttrs::new(object(1, "build-log.txt")),
    ];
    let a = m.query_job_run_artifacts(&query, 1, files.clone()).await;
    let b = m.query_job_run_artifacts(&query, 1, files).await;
    assert_eq!(a, b);
    // duplicate names collapse to one artifact each
    assert_eq!(a.len(), 2);
    assert!(a[0].artifact_url < a[1].artifact_url);
    m.close().await;
}

#[tokio::test]
async fn test_empty_query() {
    let m = manager(config(5_000, 4_000), records(&[]), artifacts(&[]));
    let response = m.query(JobArtifactQuery::default()).await;
    assert!(response.job_runs.is_empty());
    assert!(response.errors.is_empty());
    m.close().await;
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let result = Manager::new(
        config(1_000, 1_000),
        QuerySources::new(Arc::new(records(&[])), Arc::new(artifacts(&[]))),
    );
    assert!(result.is_err());
}

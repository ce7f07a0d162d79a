//! Query manager: owns both worker pools and answers top-level queries
//!
//! Construction spawns the job-run and artifact pools on the current tokio
//! runtime. [`Manager::close`] is the only shutdown path: it cancels the
//! pool-wide token and waits for every worker to exit.

mod fan_out;
mod job_run;
mod workers;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifacts::{
    ArtifactResolver, ArtifactScanner, JobArtifactQuery, JobRun, JobRunArtifact, JobRunError,
    QueryResponse, ResultCache,
};
use crate::config::{EngineConfig, Result};
use crate::stores::{ArtifactStore, ObjectAttrs, RecordStore};

use fan_out::{fan_out, Deadline};
use job_run::JobRunContext;
use workers::{run_artifact_worker, run_job_run_worker, JobRunReply, JobRunRequest};

/// External collaborators a manager queries through
#[derive(Clone)]
pub struct QuerySources {
    pub records: Arc<dyn RecordStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Optional per-job-run result cache
    pub cache: Option<Arc<dyn ResultCache>>,
}

impl QuerySources {
    pub fn new(records: Arc<dyn RecordStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            records,
            artifacts,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Owner of the job-run and artifact worker pools
pub struct Manager {
    config: EngineConfig,
    context: Arc<JobRunContext>,
    job_run_tx: Sender<JobRunRequest>,
    shutdown: CancellationToken,
    job_run_workers: Vec<JoinHandle<()>>,
    artifact_workers: Vec<JoinHandle<()>>,
}

impl Manager {
    /// Validate `config` and start both pools
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: EngineConfig, sources: QuerySources) -> Result<Self> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let (artifact_tx, artifact_rx) = async_channel::bounded(config.artifact_workers);
        let (job_run_tx, job_run_rx) = async_channel::bounded(config.job_run_workers);

        let resolver = ArtifactResolver::new(
            Arc::clone(&sources.records),
            Arc::clone(&sources.artifacts),
            config.bucket_root.clone(),
            config.max_job_files,
        );
        let scanner = ArtifactScanner::new(
            Arc::clone(&sources.artifacts),
            config.bucket_root.clone(),
            config.artifact_url_base.clone(),
            config.max_line_bytes,
        );

        let artifact_workers = (0..config.artifact_workers)
            .map(|worker_id| {
                tokio::spawn(run_artifact_worker(
                    worker_id,
                    scanner.clone(),
                    artifact_rx.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        let context = Arc::new(JobRunContext {
            resolver,
            scanner,
            cache: sources.cache,
            artifact_tx,
            cache_ttl: config.cache_ttl(),
        });

        let job_run_workers = (0..config.job_run_workers)
            .map(|worker_id| {
                tokio::spawn(run_job_run_worker(
                    worker_id,
                    Arc::clone(&context),
                    job_run_rx.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            job_run_workers = config.job_run_workers,
            artifact_workers = config.artifact_workers,
            job_run_timeout_ms = config.job_run_timeout_ms,
            artifact_timeout_ms = config.artifact_timeout_ms,
            "query manager started"
        );

        Ok(Self {
            config,
            context,
            job_run_tx,
            shutdown,
            job_run_workers,
            artifact_workers,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a query with the configured job-run timeout
    pub async fn query(&self, query: JobArtifactQuery) -> QueryResponse {
        self.run_query(query, Instant::now(), None).await
    }

    /// Run a query that must finish by `caller_deadline`
    ///
    /// The job-run and artifact timeouts both run from the same start and
    /// are each clipped to the caller's deadline. Every requested id lands
    /// in exactly one of `job_runs` / `errors`.
    pub async fn query_until(&self, query: JobArtifactQuery, caller_deadline: Instant) -> QueryResponse {
        self.run_query(query, Instant::now(), Some(caller_deadline)).await
    }

    async fn run_query(
        &self,
        query: JobArtifactQuery,
        started: Instant,
        caller_deadline: Option<Instant>,
    ) -> QueryResponse {
        let job_deadline = Deadline::clipped(started, self.config.job_run_timeout(), caller_deadline);
        let artifact_deadline =
            Deadline::clipped(started, self.config.artifact_timeout(), caller_deadline);

        let ids: BTreeSet<i64> = query.job_run_ids.iter().copied().collect();
        info!(
            job_runs = ids.len(),
            path_glob = ?query.path_glob,
            content_matcher = query.content_matcher.is_some(),
            "query started"
        );

        let query = Arc::new(query);
        let fan_in = fan_out(
            ids,
            job_deadline.at,
            &self.job_run_tx,
            |reply: &JobRunReply| reply.job_run_id,
            |id, reply| JobRunRequest {
                job_run_id: *id,
                query: Arc::clone(&query),
                deadline: job_deadline.at,
                artifact_deadline,
                reply,
            },
        )
        .await;

        let mut job_runs: Vec<(i64, JobRun)> = Vec::new();
        let mut errors: Vec<(i64, JobRunError)> = Vec::new();
        for reply in fan_in.replies {
            match reply.result {
                Ok(job_run) => job_runs.push((reply.job_run_id, job_run)),
                Err(error) => errors.push((
                    reply.job_run_id,
                    JobRunError {
                        id: reply.job_run_id.to_string(),
                        error,
                    },
                )),
            }
        }
        for id in fan_in.missing {
            warn!(job_run_id = id, "job run did not complete before deadline");
            errors.push((
                id,
                JobRunError {
                    id: id.to_string(),
                    error: timeout_message(job_deadline.window),
                },
            ));
        }

        job_runs.sort_by_key(|(id, _)| *id);
        errors.sort_by_key(|(id, _)| *id);

        info!(
            job_runs = job_runs.len(),
            errors = errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query finished"
        );

        QueryResponse {
            job_runs: job_runs.into_iter().map(|(_, job_run)| job_run).collect(),
            errors: errors.into_iter().map(|(_, error)| error).collect(),
        }
    }

    /// Scan the given files of one job run on the artifact pool
    ///
    /// Results are trimmed to the query's matcher limits and sorted by URL;
    /// files that do not answer within the artifact timeout are reported as
    /// timed out.
    pub async fn query_job_run_artifacts(
        &self,
        query: &JobArtifactQuery,
        job_run_id: i64,
        files: Vec<ObjectAttrs>,
    ) -> Vec<JobRunArtifact> {
        let deadline = Deadline::clipped(Instant::now(), self.config.artifact_timeout(), None);
        let artifacts = self
            .context
            .scan_artifacts(job_run_id, query, files, deadline)
            .await;
        let job_run = JobRun {
            artifacts,
            ..Default::default()
        };
        job_run::trim_job_run(job_run, query).artifacts
    }

    /// Cancel both pools and wait for every worker to exit
    pub async fn close(self) {
        info!("query manager shutting down");
        self.shutdown.cancel();
        self.job_run_tx.close();
        self.context.artifact_tx.close();

        for handle in self.artifact_workers.into_iter().chain(self.job_run_workers) {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        debug!("query manager stopped");
    }
}

fn timeout_message(timeout: Duration) -> String {
    format!("request did not complete within {:?}", timeout)
}

//! Worker pools: job-run workers and artifact workers
//!
//! Each worker is a long-lived task pulling from its pool's shared queue
//! until the pool-wide shutdown token fires or the queue closes.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::fan_out::{send_before, Deadline};
use super::job_run::JobRunContext;
use crate::artifacts::{ArtifactScanner, JobArtifactQuery, JobRun, JobRunArtifact};
use crate::line_matcher::LineMatcher;
use crate::stores::ObjectAttrs;

/// Work item for the job-run pool
pub(crate) struct JobRunRequest {
    pub job_run_id: i64,
    pub query: Arc<JobArtifactQuery>,
    pub deadline: Instant,
    pub artifact_deadline: Deadline,
    pub reply: Sender<JobRunReply>,
}

/// Outcome of one job run; errors are already rendered for the response
pub(crate) struct JobRunReply {
    pub job_run_id: i64,
    pub result: Result<JobRun, String>,
}

/// Work item for the artifact pool
pub(crate) struct ArtifactRequest {
    pub job_run_id: i64,
    pub attrs: ObjectAttrs,
    pub matcher: Option<LineMatcher>,
    pub deadline: Instant,
    pub reply: Sender<ArtifactReply>,
}

pub(crate) struct ArtifactReply {
    /// Object name the request was keyed by
    pub name: String,
    pub artifact: JobRunArtifact,
}

pub(crate) async fn run_job_run_worker(
    worker_id: usize,
    context: Arc<JobRunContext>,
    rx: Receiver<JobRunRequest>,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "job-run worker started");
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(request) => request,
                Err(_) => break,
            },
        };
        handle_job_run_request(worker_id, &context, request, &shutdown).await;
    }
    debug!(worker_id, "job-run worker stopped");
}

async fn handle_job_run_request(
    worker_id: usize,
    context: &JobRunContext,
    request: JobRunRequest,
    shutdown: &CancellationToken,
) {
    let job_run_id = request.job_run_id;
    if Instant::now() >= request.deadline {
        warn!(worker_id, job_run_id, "job-run request expired before it started; dropping");
        return;
    }

    let result = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            debug!(worker_id, job_run_id, "shutdown during job-run processing");
            return;
        }
        _ = sleep_until(request.deadline) => {
            warn!(worker_id, job_run_id, "job-run processing passed its deadline; dropping");
            return;
        }
        result = context.process(job_run_id, &request.query, request.artifact_deadline) => result,
    };

    let reply = JobRunReply {
        job_run_id,
        result: result.map_err(|e| {
            warn!(worker_id, job_run_id, error = %e, "job run failed");
            e.to_string()
        }),
    };
    if let Err(e) = send_before(&request.reply, reply, request.deadline).await {
        debug!(worker_id, job_run_id, error = %e, "dropping job-run reply");
    }
}

pub(crate) async fn run_artifact_worker(
    worker_id: usize,
    scanner: ArtifactScanner,
    rx: Receiver<ArtifactRequest>,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "artifact worker started");
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(request) => request,
                Err(_) => break,
            },
        };
        handle_artifact_request(worker_id, &scanner, request, &shutdown).await;
    }
    debug!(worker_id, "artifact worker stopped");
}

async fn handle_artifact_request(
    worker_id: usize,
    scanner: &ArtifactScanner,
    request: ArtifactRequest,
    shutdown: &CancellationToken,
) {
    let job_run_id = request.job_run_id;
    let name = request.attrs.name.clone();
    if Instant::now() >= request.deadline {
        warn!(worker_id, job_run_id, artifact = %name, "artifact request expired before it started; dropping");
        return;
    }

    let artifact = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        _ = sleep_until(request.deadline) => {
            warn!(worker_id, job_run_id, artifact = %name, "artifact scan passed its deadline; dropping");
            return;
        }
        artifact = scanner.scan(job_run_id, &request.attrs, request.matcher.as_ref()) => artifact,
    };

    let reply = ArtifactReply { name, artifact };
    if let Err(e) = send_before(&request.reply, reply, request.deadline).await {
        debug!(worker_id, job_run_id, error = %e, "dropping artifact reply");
    }
}

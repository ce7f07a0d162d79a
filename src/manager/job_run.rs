//! Processing of a single job run: cache, resolve, list, fan out, trim

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use tracing::{debug, info, warn};

use super::fan_out::{fan_out, Deadline};
use super::workers::{ArtifactReply, ArtifactRequest};
use crate::artifacts::cache::{get_cached_job_run, set_cached_job_run};
use crate::artifacts::{
    cache_key_for_job_run, ArtifactResolver, ArtifactScanner, JobArtifactQuery, JobRun,
    JobRunArtifact, ResolveError, ResultCache,
};
use crate::stores::ObjectAttrs;

/// Everything a job-run worker needs, shared by the whole pool
pub(crate) struct JobRunContext {
    pub resolver: ArtifactResolver,
    pub scanner: ArtifactScanner,
    pub cache: Option<Arc<dyn ResultCache>>,
    pub artifact_tx: Sender<ArtifactRequest>,
    pub cache_ttl: Duration,
}

impl JobRunContext {
    /// Produce the trimmed result for one job run
    ///
    /// Artifact scans are bounded by `artifact_deadline`; stragglers come
    /// back as timed-out entries and leave the job run non-final.
    pub async fn process(
        &self,
        job_run_id: i64,
        query: &JobArtifactQuery,
        artifact_deadline: Deadline,
    ) -> Result<JobRun, ResolveError> {
        let cache_key = self.cache.as_ref().map(|_| {
            cache_key_for_job_run(job_run_id, query.path_glob.as_deref(), query.content_matcher.as_ref())
        });

        let cached = match (&self.cache, &cache_key) {
            (Some(cache), Some(key)) => get_cached_job_run(cache.as_ref(), key).await,
            _ => None,
        };

        let job_run = match cached {
            Some(job_run) if job_run.is_final => {
                debug!(job_run_id, "serving final job run from cache");
                return Ok(trim_job_run(job_run, query));
            }
            Some(job_run) => self.requery(job_run_id, query, job_run, artifact_deadline).await?,
            None => self.resolve_and_scan(job_run_id, query, artifact_deadline).await?,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            set_cached_job_run(cache.as_ref(), key, &job_run, self.cache_ttl).await;
        }
        Ok(trim_job_run(job_run, query))
    }

    async fn resolve_and_scan(
        &self,
        job_run_id: i64,
        query: &JobArtifactQuery,
        artifact_deadline: Deadline,
    ) -> Result<JobRun, ResolveError> {
        let mut job_run = self.resolver.resolve_job_run(job_run_id).await?;
        let listing = self
            .resolver
            .list_job_run_files(&job_run.bucket_path, query.path_glob.as_deref())
            .await?;

        job_run.artifact_list_truncated = listing.truncated;
        job_run.artifacts = self
            .scan_artifacts(job_run_id, query, listing.files, artifact_deadline)
            .await;
        job_run.is_final = !job_run.artifacts.iter().any(|a| a.timed_out);
        Ok(job_run)
    }

    /// Finish a cached, non-final job run
    ///
    /// Cached artifacts that completed are kept; only the rest are scanned.
    async fn requery(
        &self,
        job_run_id: i64,
        query: &JobArtifactQuery,
        mut job_run: JobRun,
        artifact_deadline: Deadline,
    ) -> Result<JobRun, ResolveError> {
        let listing = self
            .resolver
            .list_job_run_files(&job_run.bucket_path, query.path_glob.as_deref())
            .await?;

        let mut completed: HashMap<String, JobRunArtifact> = std::mem::take(&mut job_run.artifacts)
            .into_iter()
            .filter(|a| !a.timed_out)
            .map(|a| (a.artifact_url.clone(), a))
            .collect();

        let mut artifacts = Vec::with_capacity(listing.files.len());
        let mut pending = Vec::new();
        for attrs in listing.files {
            match completed.remove(&self.scanner.artifact_url(&attrs.name)) {
                Some(done) => artifacts.push(done),
                None => pending.push(attrs),
            }
        }
        info!(
            job_run_id,
            reused = artifacts.len(),
            rescanning = pending.len(),
            "re-querying incomplete cached job run"
        );

        artifacts.extend(self.scan_artifacts(job_run_id, query, pending, artifact_deadline).await);
        artifacts.sort_by(|a, b| a.artifact_url.cmp(&b.artifact_url));

        job_run.artifact_list_truncated = listing.truncated;
        job_run.is_final = !artifacts.iter().any(|a| a.timed_out);
        job_run.artifacts = artifacts;
        Ok(job_run)
    }

    /// Scan files on the artifact pool, one request per unique object name
    ///
    /// Returns untrimmed artifacts sorted by URL, with a timed-out entry for
    /// every file that did not answer before `deadline`. The entry reports
    /// the deadline's window.
    pub async fn scan_artifacts(
        &self,
        job_run_id: i64,
        query: &JobArtifactQuery,
        files: Vec<ObjectAttrs>,
        deadline: Deadline,
    ) -> Vec<JobRunArtifact> {
        let by_name: BTreeMap<String, ObjectAttrs> =
            files.into_iter().map(|attrs| (attrs.name.clone(), attrs)).collect();
        let names: BTreeSet<String> = by_name.keys().cloned().collect();
        let matcher = query.content_matcher.clone();

        let fan_in = fan_out(
            names,
            deadline.at,
            &self.artifact_tx,
            |reply: &ArtifactReply| reply.name.clone(),
            |name, reply| ArtifactRequest {
                job_run_id,
                attrs: by_name
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| ObjectAttrs::new(name.clone())),
                matcher: matcher.clone(),
                deadline: deadline.at,
                reply,
            },
        )
        .await;

        let mut artifacts: Vec<JobRunArtifact> =
            fan_in.replies.into_iter().map(|reply| reply.artifact).collect();
        for name in fan_in.missing {
            warn!(job_run_id, artifact = %name, "artifact scan did not complete before deadline");
            let attrs = by_name.get(&name).cloned().unwrap_or_else(|| ObjectAttrs::new(name));
            artifacts.push(self.scanner.timed_out_artifact(job_run_id, &attrs, deadline.window));
        }
        artifacts.sort_by(|a, b| a.artifact_url.cmp(&b.artifact_url));
        artifacts
    }
}

/// Cut every artifact's captured matches down to the requested window
pub(crate) fn trim_job_run(mut job_run: JobRun, query: &JobArtifactQuery) -> JobRun {
    if let Some(matcher) = &query.content_matcher {
        for artifact in &mut job_run.artifacts {
            artifact.matched_content = matcher.trim_content(&artifact.matched_content);
        }
    }
    job_run
}

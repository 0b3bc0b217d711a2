//! Generation job dispatcher.
//!
//! Turns generation requests into deduplicated jobs and keeps each post's
//! pipeline run in step with its jobs:
//!
//! ```text
//! enqueue ──► run NOT_STARTED ─► IN_PROGRESS (label, progress)
//! worker  ──► begin_step       (label; false once the run is terminal)
//!         ──► succeeded/failed ─► retry with backoff, or settle the run
//! cancel  ──► run CANCELLED, pending jobs cancelled
//! ```
//!
//! Run updates are read-modify-write cycles serialized by `run_lock`; the
//! run store additionally refuses to overwrite a terminal run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use research::{PostId, RunId};

use super::errors::{DispatchError, Result};
use super::keys::{self, ImageKeyStrategy};
use super::machines::{PipelineMachine, Transition};
use super::models::{GenerationRequest, PipelineRun, PipelineStatus};
use super::stores::RunStore;
use crate::kernel::jobs::{
    EnqueueResult, FailureOutcome, Job, JobError, JobEvent, JobEvents, JobReporter, JobStore,
    RetryPolicy,
};

/// Dispatcher settings.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub retry: RetryPolicy,
    /// Keep a run alive when some of its jobs fail.
    pub partial_failure_tolerance: bool,
    pub image_keys: ImageKeyStrategy,
}

/// What the caller gets back from [`GenerationDispatcher::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub run_id: RunId,
    /// True when an active job with the same key already existed.
    pub deduplicated: bool,
}

pub struct GenerationDispatcher {
    jobs: Arc<dyn JobStore>,
    runs: Arc<dyn RunStore>,
    events: JobEvents,
    config: DispatcherConfig,
    run_lock: Mutex<()>,
}

impl GenerationDispatcher {
    pub fn new(jobs: Arc<dyn JobStore>, runs: Arc<dyn RunStore>, config: DispatcherConfig) -> Self {
        Self {
            jobs,
            runs,
            events: JobEvents::default(),
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn job_store(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Queue one unit of content for a post.
    ///
    /// Joins the post's current run, or opens a new one when there is none
    /// or the latest is terminal. A request whose key is held by a pending
    /// or running job returns that job instead.
    pub async fn enqueue(&self, request: GenerationRequest) -> Result<JobHandle> {
        let post_id = request.post_id;
        let content_type = request.content_type();
        let key = keys::idempotency_key(post_id, &request.job, self.config.image_keys, Utc::now());

        let _guard = self.run_lock.lock().await;

        let (mut run, fresh) = match self.runs.latest_for_post(post_id).await? {
            Some(run) if !run.is_terminal() => (run, false),
            _ => (PipelineRun::new(post_id), true),
        };

        let job = Job::builder()
            .job_type(content_type.as_str())
            .reference_id(post_id.into_uuid())
            .run_id(run.id.into_uuid())
            .args(serde_json::to_value(&request.job).map_err(anyhow::Error::from)?)
            .idempotency_key(key.clone())
            .max_attempts(self.config.retry.max_attempts)
            .build();

        let job_id = match self.jobs.enqueue(job).await? {
            EnqueueResult::Duplicate(existing) => {
                let run_id = self
                    .jobs
                    .find(existing)
                    .await?
                    .and_then(|job| job.run_id)
                    .map(RunId::from_uuid)
                    .unwrap_or(run.id);

                info!(job_id = %existing, idempotency_key = %key, "duplicate generation request");
                self.events.publish(JobEvent::Deduplicated {
                    job_id: existing,
                    idempotency_key: key,
                });

                return Ok(JobHandle {
                    job_id: existing,
                    run_id,
                    deduplicated: true,
                });
            }
            EnqueueResult::Created(job_id) => job_id,
        };

        let counts = self.jobs.counts_for_run(run.id.into_uuid()).await?;
        let mut next = Transition::start().with_progress(counts.percent_finished());
        if run.status == PipelineStatus::NotStarted {
            next = next.with_label("Queued");
        }
        PipelineMachine::transition(&mut run, next)?;

        if fresh {
            self.runs.insert(&run).await?;
            info!(run_id = %run.id, post_id = %post_id, "pipeline run opened");
        } else {
            self.runs.update(&run).await?;
        }

        info!(
            job_id = %job_id,
            run_id = %run.id,
            post_id = %post_id,
            content_type = %content_type,
            "generation job enqueued"
        );
        self.events.publish(JobEvent::Enqueued {
            job_id,
            job_type: content_type.as_str().to_string(),
            run_id: Some(run.id.into_uuid()),
        });

        Ok(JobHandle {
            job_id,
            run_id: run.id,
            deduplicated: false,
        })
    }

    /// Record that `job` is about to start a step, and whether it may.
    ///
    /// Returns false once the job's run is terminal; the caller stops before
    /// making further external calls.
    pub async fn begin_step(&self, job: &Job, label: &str) -> Result<bool> {
        let Some(run_id) = job.run_id.map(RunId::from_uuid) else {
            return Ok(true);
        };

        let _guard = self.run_lock.lock().await;

        let mut run = self
            .runs
            .find(run_id)
            .await?
            .ok_or_else(|| DispatchError::RunNotFound(PostId::from_uuid(job.reference_id)))?;
        if run.is_terminal() {
            debug!(job_id = %job.id, run_id = %run_id, status = %run.status, "run is terminal, stopping job");
            return Ok(false);
        }

        let counts = self.jobs.counts_for_run(run_id.into_uuid()).await?;
        PipelineMachine::transition(
            &mut run,
            Transition::start()
                .with_progress(counts.percent_finished())
                .with_label(label),
        )?;

        Ok(self.runs.update(&run).await?)
    }

    /// Cancel the post's current run and its pending jobs.
    ///
    /// Running jobs notice at their next step boundary.
    pub async fn cancel_run(&self, post_id: PostId) -> Result<PipelineRun> {
        let _guard = self.run_lock.lock().await;

        let mut run = self
            .runs
            .latest_for_post(post_id)
            .await?
            .ok_or(DispatchError::RunNotFound(post_id))?;
        let from = run.status;

        PipelineMachine::transition(&mut run, Transition::cancel())?;
        if !self.runs.update(&run).await? {
            let stored = self.runs.find(run.id).await?.map(|r| r.status).unwrap_or(from);
            warn!(run_id = %run.id, status = %stored, "run finished before it could be cancelled");
            return Err(DispatchError::TransitionRejected {
                run_id: run.id,
                from: stored,
                to: PipelineStatus::Cancelled,
            });
        }

        let cancelled = self.jobs.cancel_pending_for_run(run.id.into_uuid()).await?;
        for job_id in &cancelled {
            self.events.publish(JobEvent::Cancelled {
                job_id: *job_id,
                reason: Some("run cancelled".to_string()),
            });
        }

        info!(
            run_id = %run.id,
            post_id = %post_id,
            cancelled_jobs = cancelled.len(),
            "pipeline run cancelled"
        );
        Ok(run)
    }

    /// Current run for the post.
    pub async fn pipeline(&self, post_id: PostId) -> Result<PipelineRun> {
        self.runs
            .latest_for_post(post_id)
            .await?
            .ok_or(DispatchError::RunNotFound(post_id))
    }

    pub async fn job(&self, job_id: Uuid) -> Result<Job> {
        self.jobs
            .find(job_id)
            .await?
            .ok_or(DispatchError::JobNotFound(job_id))
    }

    pub async fn jobs_for_run(&self, run_id: RunId) -> Result<Vec<Job>> {
        Ok(self.jobs.jobs_for_run(run_id.into_uuid()).await?)
    }

    /// Fail the run right away and cancel what has not started.
    async fn fail_run(&self, run_id: RunId, reason: String) -> Result<()> {
        let _guard = self.run_lock.lock().await;

        let Some(mut run) = self.runs.find(run_id).await? else {
            return Ok(());
        };
        if run.is_terminal() {
            return Ok(());
        }

        PipelineMachine::transition(&mut run, Transition::fail(reason.clone()))?;
        if !self.runs.update(&run).await? {
            return Ok(());
        }

        let cancelled = self.jobs.cancel_pending_for_run(run_id.into_uuid()).await?;
        for job_id in &cancelled {
            self.events.publish(JobEvent::Cancelled {
                job_id: *job_id,
                reason: Some("run failed".to_string()),
            });
        }

        error!(run_id = %run_id, reason = %reason, "pipeline run failed");
        Ok(())
    }

    /// Move the run forward after a job finished: refresh progress, or
    /// settle it once nothing is outstanding.
    async fn settle(&self, run_id: RunId) -> Result<()> {
        let _guard = self.run_lock.lock().await;

        let Some(mut run) = self.runs.find(run_id).await? else {
            return Ok(());
        };
        if run.is_terminal() {
            debug!(run_id = %run_id, status = %run.status, "run already settled");
            return Ok(());
        }

        let counts = self.jobs.counts_for_run(run_id.into_uuid()).await?;
        let next = match PipelineMachine::settle(&counts, self.config.partial_failure_tolerance) {
            Some(PipelineStatus::Completed) => Transition::complete().with_label("Completed"),
            Some(PipelineStatus::Failed) => {
                Transition::fail(format!("all {} jobs failed", counts.failed)).with_label("Failed")
            }
            Some(status) => Transition::to(status),
            None => Transition::start().with_progress(counts.percent_finished()),
        };
        let finished = next.to.is_terminal();

        PipelineMachine::transition(&mut run, next)?;
        self.runs.update(&run).await?;

        if finished {
            info!(
                run_id = %run_id,
                status = %run.status,
                succeeded = counts.succeeded,
                failed = counts.failed,
                "pipeline run finished"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl JobReporter for GenerationDispatcher {
    async fn started(&self, job: &Job, worker_id: &str) {
        debug!(job_id = %job.id, worker_id = %worker_id, attempt = job.attempt, "job started");
        self.events.publish(JobEvent::Started {
            job_id: job.id,
            job_type: job.job_type.clone(),
            worker_id: worker_id.to_string(),
            attempt: job.attempt,
        });
    }

    async fn succeeded(&self, job: &Job, elapsed: Duration) -> anyhow::Result<()> {
        self.jobs.mark_succeeded(job.id).await?;

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            duration_ms = elapsed.as_millis() as u64,
            "generation job succeeded"
        );
        self.events.publish(JobEvent::Succeeded {
            job_id: job.id,
            job_type: job.job_type.clone(),
            duration_ms: elapsed.as_millis() as u64,
        });

        if let Some(run_id) = job.run_id.map(RunId::from_uuid) {
            self.settle(run_id).await?;
        }
        Ok(())
    }

    async fn failed(&self, job: &Job, failure: JobError) -> anyhow::Result<FailureOutcome> {
        let outcome = self
            .jobs
            .mark_failed(job.id, &failure.message, failure.kind, &self.config.retry)
            .await?;
        let run_id = job.run_id.map(RunId::from_uuid);

        match outcome {
            FailureOutcome::RetryScheduled { attempt, run_at } => {
                warn!(
                    job_id = %job.id,
                    attempt,
                    retry_at = %run_at,
                    error = %failure.message,
                    "generation job will retry"
                );
                self.events.publish(JobEvent::RetryScheduled {
                    job_id: job.id,
                    attempt,
                    error: failure.message,
                    run_at,
                });
            }
            FailureOutcome::Failed => {
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempt,
                    error_kind = ?failure.kind,
                    error = %failure.message,
                    "generation job failed"
                );
                let reason = format!("{} job failed: {}", job.job_type, failure.message);
                self.events.publish(JobEvent::Failed {
                    job_id: job.id,
                    job_type: job.job_type.clone(),
                    error: failure.message,
                    error_kind: failure.kind,
                    attempt: job.attempt,
                });

                if let Some(run_id) = run_id {
                    if self.config.partial_failure_tolerance {
                        self.settle(run_id).await?;
                    } else {
                        self.fail_run(run_id, reason).await?;
                    }
                }
            }
            FailureOutcome::Cancelled => {
                info!(job_id = %job.id, "generation job cancelled");
                self.events.publish(JobEvent::Cancelled {
                    job_id: job.id,
                    reason: Some(failure.message),
                });
                if let Some(run_id) = run_id {
                    self.settle(run_id).await?;
                }
            }
        }

        Ok(outcome)
    }
}

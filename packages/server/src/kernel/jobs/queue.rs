//! Job store contract shared by the in-memory and PostgreSQL queues.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::{ErrorKind, FailureOutcome, Job, JobStatus, RetryPolicy};
use super::retention::RetentionPolicy;

/// Result type for enqueue operations that handles idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Command was enqueued, returns new job ID
    Created(Uuid),
    /// Command already exists (idempotency hit), returns existing job ID
    Duplicate(Uuid),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// Job tallies for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobCounts {
    pub fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.outstanding() + self.finished()
    }

    pub fn outstanding(&self) -> usize {
        self.pending + self.running
    }

    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    /// Whole-number share of finished jobs, 0 when there are none.
    pub fn percent_finished(&self) -> u8 {
        match self.total() {
            0 => 0,
            total => ((self.finished() * 100) / total) as u8,
        }
    }
}

impl FromIterator<JobStatus> for JobCounts {
    fn from_iter<I: IntoIterator<Item = JobStatus>>(iter: I) -> Self {
        let mut counts = JobCounts::default();
        for status in iter {
            counts.add(status);
        }
        counts
    }
}

/// Trait for job queue operations.
///
/// Implementations must make `enqueue` atomic with respect to the
/// idempotency key: two concurrent enqueues with the same key leave exactly
/// one pending/running job behind.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job unless another pending/running job holds its key.
    async fn enqueue(&self, job: Job) -> Result<EnqueueResult>;

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Claim up to `limit` ready jobs, moving them to running and counting
    /// the attempt.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

    /// Mark a job as successfully completed.
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Record a failed attempt.
    ///
    /// Retryable errors with attempts remaining put the job back to pending
    /// with a backoff `run_at`; anything else finishes it.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        kind: ErrorKind,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome>;

    /// Cancel every pending job of a run. Returns the cancelled ids.
    async fn cancel_pending_for_run(&self, run_id: Uuid) -> Result<Vec<Uuid>>;

    async fn jobs_for_run(&self, run_id: Uuid) -> Result<Vec<Job>>;

    async fn counts_for_run(&self, run_id: Uuid) -> Result<JobCounts> {
        let jobs = self.jobs_for_run(run_id).await?;
        Ok(jobs.into_iter().map(|job| job.status).collect())
    }

    /// Delete finished jobs the policy no longer keeps. Returns the number
    /// removed.
    async fn prune(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<u64>;
}

//! In-process job store.
//!
//! Used when no database is configured and by tests. A single mutex guards
//! both the jobs and the active idempotency-key index, which makes
//! deduplication atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::{ErrorKind, FailureOutcome, Job, JobStatus, RetryPolicy};
use super::queue::{EnqueueResult, JobStore};
use super::retention::RetentionPolicy;

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    /// Idempotency key -> id of the pending/running job holding it.
    active_keys: HashMap<String, Uuid>,
}

impl State {
    fn release_key(&mut self, job_id: Uuid) {
        let key = self
            .jobs
            .get(&job_id)
            .and_then(|job| job.idempotency_key.clone());
        if let Some(key) = key {
            if self.active_keys.get(&key) == Some(&job_id) {
                self.active_keys.remove(&key);
            }
        }
    }

    fn finish(&mut self, job_id: Uuid, status: JobStatus, now: DateTime<Utc>) {
        self.release_key(job_id);
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.status = status;
            job.worker_id = None;
            job.updated_at = now;
            job.finished_at = Some(now);
        }
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<State>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.state().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, mut job: Job) -> Result<EnqueueResult> {
        let mut state = self.state();

        if let Some(key) = &job.idempotency_key {
            if let Some(existing) = state.active_keys.get(key) {
                return Ok(EnqueueResult::Duplicate(*existing));
            }
            state.active_keys.insert(key.clone(), job.id);
        }

        job.status = JobStatus::Pending;
        let id = job.id;
        state.jobs.insert(id, job);
        Ok(EnqueueResult::Created(id))
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state().jobs.get(&job_id).cloned())
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut state = self.state();

        let mut ready: Vec<&mut Job> = state
            .jobs
            .values_mut()
            .filter(|job| job.is_ready(now))
            .collect();
        ready.sort_by_key(|job| (job.run_at, job.created_at));

        let claimed = ready
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| {
                job.status = JobStatus::Running;
                job.attempt += 1;
                job.worker_id = Some(worker_id.to_string());
                job.updated_at = now;
                job.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        let mut state = self.state();
        if !state.jobs.contains_key(&job_id) {
            return Err(anyhow!("job {} not found", job_id));
        }
        state.finish(job_id, JobStatus::Succeeded, Utc::now());
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        kind: ErrorKind,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome> {
        let now = Utc::now();
        let mut state = self.state();

        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;
        job.error_message = Some(error.to_string());
        job.error_kind = Some(kind);

        let outcome = job.failure_outcome(kind, policy, now);
        match outcome {
            FailureOutcome::RetryScheduled { run_at, .. } => {
                job.status = JobStatus::Pending;
                job.run_at = run_at;
                job.worker_id = None;
                job.updated_at = now;
            }
            FailureOutcome::Failed => state.finish(job_id, JobStatus::Failed, now),
            FailureOutcome::Cancelled => state.finish(job_id, JobStatus::Cancelled, now),
        }

        Ok(outcome)
    }

    async fn cancel_pending_for_run(&self, run_id: Uuid) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let mut state = self.state();

        let ids: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|job| job.run_id == Some(run_id) && job.status == JobStatus::Pending)
            .map(|job| job.id)
            .collect();

        for id in &ids {
            state.finish(*id, JobStatus::Cancelled, now);
            if let Some(job) = state.jobs.get_mut(id) {
                job.error_kind = Some(ErrorKind::Cancelled);
                job.error_message = Some("run cancelled".to_string());
            }
        }

        Ok(ids)
    }

    async fn jobs_for_run(&self, run_id: Uuid) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .state()
            .jobs
            .values()
            .filter(|job| job.run_id == Some(run_id))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn prune(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state();
        let expired = policy.expired(state.jobs.values(), now);
        for id in &expired {
            state.jobs.remove(id);
        }
        Ok(expired.len() as u64)
    }
}

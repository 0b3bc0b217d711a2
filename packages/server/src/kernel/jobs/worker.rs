//! Job worker service for processing background jobs.
//!
//! The `JobWorker` is a long-running service that:
//! - Polls the store for ready jobs via `JobStore::claim`
//! - Executes each claimed job through a [`JobHandler`]
//! - Hands the outcome to a [`JobReporter`], which records success or
//!   schedules the retry
//!
//! # Architecture
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► Poll store (claim jobs via JobStore)
//!     ├─► JobHandler.execute(job, cancel)
//!     └─► JobReporter.succeeded / failed
//! ```
//!
//! Several workers may share one store; claiming is exclusive, so each job
//! attempt runs on exactly one worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{FailureOutcome, Job, JobError};
use super::queue::JobStore;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available (max)
    pub max_poll_interval: Duration,
    /// Minimum poll interval
    pub min_poll_interval: Duration,
    /// How long shutdown waits for running jobs
    pub shutdown_grace: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_poll_interval: Duration::from_secs(2),
            min_poll_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(30),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Executes one claimed job attempt.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// `cancel` fires when the worker shuts down.
    async fn execute(&self, job: &Job, cancel: CancellationToken) -> Result<(), JobError>;
}

/// Records the outcome of job attempts.
#[async_trait]
pub trait JobReporter: Send + Sync {
    async fn started(&self, job: &Job, worker_id: &str);

    async fn succeeded(&self, job: &Job, elapsed: Duration) -> Result<()>;

    async fn failed(&self, job: &Job, error: JobError) -> Result<FailureOutcome>;
}

/// A job worker that processes jobs from a store.
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    reporter: Arc<dyn JobReporter>,
    config: JobWorkerConfig,
    /// Track running jobs for cancellation
    running_jobs: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(
        store: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
        reporter: Arc<dyn JobReporter>,
    ) -> Self {
        Self::with_config(store, handler, reporter, JobWorkerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        store: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
        reporter: Arc<dyn JobReporter>,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            store,
            handler,
            reporter,
            config,
            running_jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Process a single claimed job.
    async fn process_job(&self, job: Job, shutdown: &CancellationToken) {
        let job_id = job.id;

        // Create cancellation token for this job
        let job_cancel = shutdown.child_token();
        self.running_jobs
            .write()
            .await
            .insert(job_id, job_cancel.clone());

        self.reporter.started(&job, &self.config.worker_id).await;
        let started = Instant::now();

        match self.handler.execute(&job, job_cancel).await {
            Ok(()) => {
                debug!(job_id = %job_id, job_type = %job.job_type, "job succeeded");
                if let Err(e) = self.reporter.succeeded(&job, started.elapsed()).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                }
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    job_type = %job.job_type,
                    attempt = job.attempt,
                    error = %e,
                    "job failed"
                );
                if let Err(e) = self.reporter.failed(&job, e).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                }
            }
        }

        self.running_jobs.write().await.remove(&job_id);
    }

    /// Claim one batch and run it to completion. Returns the number of jobs
    /// processed.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<usize> {
        let jobs = self
            .store
            .claim(&self.config.worker_id, self.config.batch_size)
            .await?;

        if jobs.is_empty() {
            return Ok(0);
        }

        debug!(worker_id = %self.config.worker_id, count = jobs.len(), "claimed jobs");
        let count = jobs.len();

        // Process jobs concurrently
        let handles = jobs.into_iter().map(|job| self.process_job(job, shutdown));
        futures::future::join_all(handles).await;

        Ok(count)
    }

    /// Poll until `shutdown` fires, then let running jobs wind down.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "job worker starting"
        );

        let mut idle_interval = self.config.min_poll_interval;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let processed = match self.run_once(&shutdown).await {
                Ok(processed) => processed,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                    continue;
                }
            };

            if processed > 0 {
                idle_interval = self.config.min_poll_interval;
                continue;
            }

            // No jobs available, back off up to the max interval
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(idle_interval) => {}
            }
            idle_interval = (idle_interval * 2).min(self.config.max_poll_interval);
        }

        self.drain().await;

        info!(worker_id = %self.config.worker_id, "job worker stopped");
        Ok(())
    }

    async fn drain(&self) {
        let running_count = self.running_jobs.read().await.len();
        if running_count == 0 {
            return;
        }

        info!(count = running_count, "waiting for running jobs to complete");
        for token in self.running_jobs.read().await.values() {
            token.cancel();
        }

        let start = Instant::now();
        while !self.running_jobs.read().await.is_empty() && start.elapsed() < self.config.shutdown_grace {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

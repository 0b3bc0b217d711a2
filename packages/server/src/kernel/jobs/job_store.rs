//! PostgreSQL-backed job store.
//!
//! Deduplication relies on the partial unique index
//! `jobs_active_idempotency_key` (pending/running rows only), so concurrent
//! enqueues across processes still leave a single active job per key.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::job::{ErrorKind, FailureOutcome, Job, RetryPolicy};
use super::queue::{EnqueueResult, JobStore};
use super::retention::RetentionPolicy;

const JOB_COLUMNS: &str = "id, job_type, reference_id, run_id, args, idempotency_key, status, \
     attempt, max_attempts, run_at, worker_id, error_message, error_kind, \
     created_at, updated_at, finished_at";

/// Enqueue retries when the conflicting job finishes between insert and lookup.
const ENQUEUE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check if a job with the given idempotency key is pending or running.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE idempotency_key = $1 AND status IN ('pending', 'running') \
             LIMIT 1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn insert_if_absent(&self, job: &Job) -> Result<Option<Uuid>> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO jobs (
                id, job_type, reference_id, run_id, args, idempotency_key, status,
                attempt, max_attempts, run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, $7, $8, NOW(), NOW())
            ON CONFLICT (idempotency_key) WHERE status IN ('pending', 'running')
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(job.reference_id)
        .bind(job.run_id)
        .bind(&job.args)
        .bind(&job.idempotency_key)
        .bind(job.max_attempts)
        .bind(job.run_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted)
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn enqueue(&self, job: Job) -> Result<EnqueueResult> {
        let Some(key) = job.idempotency_key.clone() else {
            let id = self
                .insert_if_absent(&job)
                .await?
                .ok_or_else(|| anyhow!("insert of job {} returned no row", job.id))?;
            return Ok(EnqueueResult::Created(id));
        };

        for _ in 0..ENQUEUE_ATTEMPTS {
            if let Some(id) = self.insert_if_absent(&job).await? {
                return Ok(EnqueueResult::Created(id));
            }
            if let Some(existing) = self.find_by_idempotency_key(&key).await? {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
            debug!(idempotency_key = %key, "conflicting job finished during enqueue, retrying");
        }

        Err(anyhow!("could not enqueue job with key {}", key))
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending' AND run_at <= NOW()
                ORDER BY run_at, created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET
                status = 'running',
                attempt = attempt + 1,
                worker_id = $2,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(limit)
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                worker_id = NULL,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        kind: ErrorKind,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        let outcome = job.failure_outcome(kind, policy, Utc::now());
        match outcome {
            FailureOutcome::RetryScheduled { run_at, .. } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'pending',
                        run_at = $1,
                        worker_id = NULL,
                        error_message = $2,
                        error_kind = $3,
                        updated_at = NOW()
                    WHERE id = $4
                    "#,
                )
                .bind(run_at)
                .bind(error)
                .bind(kind)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            }
            FailureOutcome::Failed | FailureOutcome::Cancelled => {
                let status = if outcome == FailureOutcome::Failed {
                    "failed"
                } else {
                    "cancelled"
                };
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = $1::job_status,
                        worker_id = NULL,
                        error_message = $2,
                        error_kind = $3,
                        finished_at = NOW(),
                        updated_at = NOW()
                    WHERE id = $4
                    "#,
                )
                .bind(status)
                .bind(error)
                .bind(kind)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn cancel_pending_for_run(&self, run_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE jobs
            SET status = 'cancelled',
                error_kind = 'cancelled',
                error_message = 'run cancelled',
                finished_at = NOW(),
                updated_at = NOW()
            WHERE run_id = $1 AND status = 'pending'
            RETURNING id
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn jobs_for_run(&self, run_id: Uuid) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE run_id = $1 ORDER BY created_at"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn prune(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<u64> {
        let expired = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE (status IN ('succeeded', 'cancelled') AND COALESCE(finished_at, updated_at) < $1)
               OR (status = 'failed' AND COALESCE(finished_at, updated_at) < $2)
            "#,
        )
        .bind(policy.completed_cutoff(now))
        .bind(policy.failed_cutoff(now))
        .execute(&self.pool)
        .await?
        .rows_affected();

        let over_cap = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status IN ('succeeded', 'cancelled')
                ORDER BY COALESCE(finished_at, updated_at) DESC
                OFFSET $1
            )
            "#,
        )
        .bind(policy.completed_max_count as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(expired + over_cap)
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use research::{PostId, RunId};

use crate::domains::generation::models::{PipelineRun, PipelineStatus};

/// Persistence for pipeline runs.
///
/// Writes are last-write-wins, except that a run stored in a terminal state
/// is never overwritten.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Most recently created run for the post.
    async fn latest_for_post(&self, post_id: PostId) -> Result<Option<PipelineRun>>;

    async fn find(&self, run_id: RunId) -> Result<Option<PipelineRun>>;

    async fn insert(&self, run: &PipelineRun) -> Result<()>;

    /// Returns false when the stored run was already terminal.
    async fn update(&self, run: &PipelineRun) -> Result<bool>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct Runs {
    by_id: HashMap<RunId, PipelineRun>,
    /// Run ids per post, oldest first.
    by_post: HashMap<PostId, Vec<RunId>>,
}

#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<Runs>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, Runs> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn latest_for_post(&self, post_id: PostId) -> Result<Option<PipelineRun>> {
        let runs = self.runs();
        Ok(runs
            .by_post
            .get(&post_id)
            .and_then(|ids| ids.last())
            .and_then(|id| runs.by_id.get(id))
            .cloned())
    }

    async fn find(&self, run_id: RunId) -> Result<Option<PipelineRun>> {
        Ok(self.runs().by_id.get(&run_id).cloned())
    }

    async fn insert(&self, run: &PipelineRun) -> Result<()> {
        let mut runs = self.runs();
        runs.by_id.insert(run.id, run.clone());
        runs.by_post.entry(run.post_id).or_default().push(run.id);
        Ok(())
    }

    async fn update(&self, run: &PipelineRun) -> Result<bool> {
        let mut runs = self.runs();
        match runs.by_id.get_mut(&run.id) {
            Some(stored) if stored.is_terminal() => Ok(false),
            Some(stored) => {
                *stored = run.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(FromRow)]
struct RunRow {
    id: Uuid,
    post_id: Uuid,
    status: PipelineStatus,
    progress: Option<i16>,
    label: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<RunRow> for PipelineRun {
    fn from(row: RunRow) -> Self {
        Self {
            id: RunId::from_uuid(row.id),
            post_id: PostId::from_uuid(row.post_id),
            status: row.status,
            progress: row.progress.map(|p| p.clamp(0, 100) as u8),
            label: row.label,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            finished_at: row.finished_at,
        }
    }
}

#[derive(Clone)]
pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn latest_for_post(&self, post_id: PostId) -> Result<Option<PipelineRun>> {
        let row = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM pipeline_runs WHERE post_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(post_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find(&self, run_id: RunId) -> Result<Option<PipelineRun>> {
        let row = sqlx::query_as::<_, RunRow>("SELECT * FROM pipeline_runs WHERE id = $1")
            .bind(run_id.into_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, run: &PipelineRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (
                id, post_id, status, progress, label, error, created_at, updated_at, finished_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id.into_uuid())
        .bind(run.post_id.into_uuid())
        .bind(run.status)
        .bind(run.progress.map(i16::from))
        .bind(&run.label)
        .bind(&run.error)
        .bind(run.created_at)
        .bind(run.updated_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, run: &PipelineRun) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = $2,
                progress = $3,
                label = $4,
                error = $5,
                updated_at = $6,
                finished_at = $7
            WHERE id = $1
              AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(run.id.into_uuid())
        .bind(run.status)
        .bind(run.progress.map(i16::from))
        .bind(&run.label)
        .bind(&run.error)
        .bind(run.updated_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }
}

use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::ApiError;
use crate::kernel::jobs::{ErrorKind, Job, JobStatus};
use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub job_type: String,
    pub post_id: Uuid,
    pub run_id: Option<Uuid>,
    pub status: JobStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    /// Earliest time of the next attempt while pending.
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            post_id: job.reference_id,
            run_id: job.run_id,
            status: job.status,
            attempt: job.attempt,
            max_attempts: job.max_attempts,
            run_at: job.run_at,
            last_error: job.error_message,
            error_kind: job.error_kind,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

/// GET /jobs/:job_id
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.dispatcher.job(job_id).await?;
    Ok(Json(job.into()))
}

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use research::{Interview, PostId};

use super::error::ApiError;
use crate::domains::generation::{
    Artifact, DispatchError, GenerationRequest, JobHandle, PipelineRun,
};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    pub content_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Pipeline read model.
#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    #[serde(flatten)]
    pub run: PipelineRun,
    pub jobs: JobSummary,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// PUT /posts/:post_id/interview
pub async fn put_interview_handler(
    Extension(state): Extension<AppState>,
    Path(post_id): Path<Uuid>,
    Json(interview): Json<Interview>,
) -> Result<StatusCode, ApiError> {
    state
        .posts
        .save_interview(PostId::from_uuid(post_id), &interview)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/:post_id/generation-jobs
pub async fn enqueue_generation_handler(
    Extension(state): Extension<AppState>,
    Path(post_id): Path<Uuid>,
    Json(body): Json<EnqueueBody>,
) -> Result<(StatusCode, Json<JobHandle>), ApiError> {
    let post_id = PostId::from_uuid(post_id);
    let request = GenerationRequest::parse(post_id, &body.content_type, body.payload)?;

    if state.posts.interview(post_id).await?.is_none() {
        return Err(DispatchError::InterviewNotFound(post_id).into());
    }

    let handle = state.dispatcher.enqueue(request).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// GET /posts/:post_id/pipeline
pub async fn pipeline_status_handler(
    Extension(state): Extension<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let run = state.dispatcher.pipeline(PostId::from_uuid(post_id)).await?;
    let counts = state
        .dispatcher
        .job_store()
        .counts_for_run(run.id.into_uuid())
        .await?;

    Ok(Json(PipelineResponse {
        run,
        jobs: JobSummary {
            total: counts.total(),
            pending: counts.pending,
            running: counts.running,
            succeeded: counts.succeeded,
            failed: counts.failed,
            cancelled: counts.cancelled,
        },
    }))
}

/// POST /posts/:post_id/pipeline/cancel
pub async fn cancel_pipeline_handler(
    Extension(state): Extension<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PipelineRun>, ApiError> {
    let run = state.dispatcher.cancel_run(PostId::from_uuid(post_id)).await?;
    Ok(Json(run))
}

/// GET /posts/:post_id/artifacts
pub async fn list_artifacts_handler(
    Extension(state): Extension<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<Artifact>>, ApiError> {
    let artifacts = state.posts.artifacts(PostId::from_uuid(post_id)).await?;
    Ok(Json(artifacts))
}

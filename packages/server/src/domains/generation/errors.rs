use thiserror::Error;
use uuid::Uuid;

use research::{PostId, RunId};

use super::models::{ContentType, PipelineStatus};

/// Errors from the dispatcher and the run state machine.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Content-type tag outside the closed set. Reported before anything
    /// is enqueued.
    #[error("configuration error: unknown content type '{0}'")]
    UnknownContentType(String),

    #[error("invalid {content_type} payload: {reason}")]
    InvalidPayload {
        content_type: ContentType,
        reason: String,
    },

    /// The run is terminal, or the move is not an edge of the machine.
    #[error("run {run_id} cannot move from {from} to {to}")]
    TransitionRejected {
        run_id: RunId,
        from: PipelineStatus,
        to: PipelineStatus,
    },

    #[error("no pipeline run for post {0}")]
    RunNotFound(PostId),

    #[error("post {0} has no interview")]
    InterviewNotFound(PostId),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl DispatchError {
    /// Caller mistakes that no retry can fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownContentType(_) | DispatchError::InvalidPayload { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DispatchError::RunNotFound(_)
                | DispatchError::InterviewNotFound(_)
                | DispatchError::JobNotFound(_)
        )
    }
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use research::{PostId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "pipeline_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::NotStarted => "not_started",
            PipelineStatus::InProgress => "in_progress",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        }
    }

    /// True exactly for completed, failed and cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of the generation pipeline for a post.
///
/// Mutated only through [`PipelineMachine`](crate::domains::generation::machines::PipelineMachine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub post_id: PostId,
    pub status: PipelineStatus,
    /// 0-100
    pub progress: Option<u8>,
    pub label: Option<String>,
    /// Reason recorded when the run failed.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(post_id: PostId) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            post_id,
            status: PipelineStatus::NotStarted,
            progress: None,
            label: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!PipelineStatus::NotStarted.is_terminal());
        assert!(!PipelineStatus::InProgress.is_terminal());
        assert!(PipelineStatus::Completed.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(PipelineStatus::Cancelled.is_terminal());
    }

    #[test]
    fn new_run_has_not_started() {
        let run = PipelineRun::new(PostId::new());
        assert_eq!(run.status, PipelineStatus::NotStarted);
        assert!(run.progress.is_none());
        assert_eq!(serde_json::to_value(run.status).unwrap(), "not_started");
    }
}

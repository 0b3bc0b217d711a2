//! Pipeline run state machine
//!
//! Pure decision logic - NO IO, only state transitions.
//!
//! ```text
//! NOT_STARTED ──► IN_PROGRESS ──► COMPLETED
//!      │              │ ▲    └──► FAILED
//!      │              └─┘    └──► CANCELLED
//!      └──────────────────────────► (any terminal state)
//! ```
//!
//! IN_PROGRESS may move to itself to update progress or label. Terminal
//! runs never move again; a rejected move leaves the run untouched.

use chrono::Utc;
use tracing::warn;

use crate::domains::generation::errors::{DispatchError, Result};
use crate::domains::generation::models::{PipelineRun, PipelineStatus};
use crate::kernel::jobs::JobCounts;

/// A requested change to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: PipelineStatus,
    pub progress: Option<u8>,
    pub label: Option<String>,
    pub error: Option<String>,
}

impl Transition {
    pub fn to(status: PipelineStatus) -> Self {
        Self {
            to: status,
            progress: None,
            label: None,
            error: None,
        }
    }

    pub fn start() -> Self {
        Self::to(PipelineStatus::InProgress)
    }

    pub fn complete() -> Self {
        Self::to(PipelineStatus::Completed)
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::to(PipelineStatus::Failed)
        }
    }

    pub fn cancel() -> Self {
        Self::to(PipelineStatus::Cancelled).with_label("Cancelled")
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

pub struct PipelineMachine;

impl PipelineMachine {
    /// Whether `from -> to` is an edge of the machine.
    pub fn allows(from: PipelineStatus, to: PipelineStatus) -> bool {
        !from.is_terminal() && to != PipelineStatus::NotStarted
    }

    /// Apply `next` to `run`, or reject it and leave `run` unchanged.
    pub fn transition(run: &mut PipelineRun, next: Transition) -> Result<()> {
        if !Self::allows(run.status, next.to) {
            warn!(
                run_id = %run.id,
                post_id = %run.post_id,
                from = %run.status,
                to = %next.to,
                "rejected pipeline transition"
            );
            return Err(DispatchError::TransitionRejected {
                run_id: run.id,
                from: run.status,
                to: next.to,
            });
        }

        let now = Utc::now();
        run.status = next.to;
        if let Some(progress) = next.progress {
            run.progress = Some(progress.min(100));
        }
        if next.to == PipelineStatus::Completed {
            run.progress = Some(100);
        }
        if let Some(label) = next.label {
            run.label = Some(label);
        }
        if let Some(error) = next.error {
            run.error = Some(error);
        }
        run.updated_at = now;
        if next.to.is_terminal() {
            run.finished_at = Some(now);
        }

        Ok(())
    }

    /// Terminal status for a run whose jobs are all finished, or `None`
    /// while any are still pending or running.
    ///
    /// Without tolerance a single failed job fails the run. With tolerance
    /// the run completes when at least one job succeeded.
    pub fn settle(counts: &JobCounts, tolerate_partial_failure: bool) -> Option<PipelineStatus> {
        if counts.total() == 0 || counts.outstanding() > 0 {
            return None;
        }

        let status = if counts.failed > 0 && !tolerate_partial_failure {
            PipelineStatus::Failed
        } else if counts.succeeded > 0 {
            PipelineStatus::Completed
        } else if counts.failed > 0 {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Cancelled
        };

        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use research::PostId;

    use crate::kernel::jobs::JobStatus;

    fn counts(statuses: &[JobStatus]) -> JobCounts {
        statuses.iter().copied().collect()
    }

    #[test]
    fn happy_path() {
        let mut run = PipelineRun::new(PostId::new());
        PipelineMachine::transition(&mut run, Transition::start()).unwrap();
        PipelineMachine::transition(
            &mut run,
            Transition::start().with_progress(40).with_label("Gathering research"),
        )
        .unwrap();
        assert_eq!(run.progress, Some(40));
        assert_eq!(run.label.as_deref(), Some("Gathering research"));

        PipelineMachine::transition(&mut run, Transition::complete()).unwrap();
        assert_eq!(run.status, PipelineStatus::Completed);
        assert_eq!(run.progress, Some(100));
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn terminal_runs_reject_every_transition() {
        for terminal in [
            PipelineStatus::Completed,
            PipelineStatus::Failed,
            PipelineStatus::Cancelled,
        ] {
            let mut run = PipelineRun::new(PostId::new());
            PipelineMachine::transition(&mut run, Transition::to(terminal)).unwrap();
            let frozen = run.clone();

            for next in [
                PipelineStatus::NotStarted,
                PipelineStatus::InProgress,
                PipelineStatus::Completed,
                PipelineStatus::Failed,
                PipelineStatus::Cancelled,
            ] {
                let err = PipelineMachine::transition(&mut run, Transition::to(next).with_progress(5))
                    .unwrap_err();
                assert!(matches!(err, DispatchError::TransitionRejected { from, .. } if from == terminal));
                assert_eq!(run, frozen);
            }
        }
    }

    #[test]
    fn not_started_can_be_cancelled_but_not_restarted() {
        assert!(PipelineMachine::allows(
            PipelineStatus::NotStarted,
            PipelineStatus::Cancelled
        ));
        assert!(!PipelineMachine::allows(
            PipelineStatus::NotStarted,
            PipelineStatus::NotStarted
        ));
        assert!(!PipelineMachine::allows(
            PipelineStatus::InProgress,
            PipelineStatus::NotStarted
        ));
    }

    #[test]
    fn failure_reason_is_kept() {
        let mut run = PipelineRun::new(PostId::new());
        PipelineMachine::transition(&mut run, Transition::start()).unwrap();
        PipelineMachine::transition(&mut run, Transition::fail("faq: provider rejected key")).unwrap();
        assert_eq!(run.error.as_deref(), Some("faq: provider rejected key"));
    }

    #[test]
    fn settle_waits_for_outstanding_jobs() {
        use JobStatus::*;
        assert_eq!(PipelineMachine::settle(&counts(&[]), false), None);
        assert_eq!(PipelineMachine::settle(&counts(&[Succeeded, Running]), false), None);
        assert_eq!(
            PipelineMachine::settle(&counts(&[Succeeded, Succeeded]), false),
            Some(PipelineStatus::Completed)
        );
    }

    #[test]
    fn settle_applies_partial_failure_tolerance() {
        use JobStatus::*;
        assert_eq!(
            PipelineMachine::settle(&counts(&[Succeeded, Failed]), false),
            Some(PipelineStatus::Failed)
        );
        assert_eq!(
            PipelineMachine::settle(&counts(&[Succeeded, Failed]), true),
            Some(PipelineStatus::Completed)
        );
        assert_eq!(
            PipelineMachine::settle(&counts(&[Failed, Failed]), true),
            Some(PipelineStatus::Failed)
        );
    }
}

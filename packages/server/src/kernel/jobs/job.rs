//! Job model for background generation work.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and running jobs hold their idempotency key.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
    /// Job was cancelled by user/system
    Cancelled,
    /// Job was interrupted by graceful shutdown - will retry
    Shutdown,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::Shutdown)
    }
}

// ============================================================================
// Failures
// ============================================================================

/// Why a job attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub kind: ErrorKind,
}

impl JobError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Retryable,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::NonRetryable,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Cancelled,
        }
    }

    pub fn shutdown() -> Self {
        Self {
            message: "worker shutting down".to_string(),
            kind: ErrorKind::Shutdown,
        }
    }
}

/// What the store did with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The job went back to pending and becomes claimable at `run_at`.
    RetryScheduled { attempt: i32, run_at: DateTime<Utc> },
    /// Attempts exhausted or the error was not retryable.
    Failed,
    Cancelled,
}

impl FailureOutcome {
    pub fn is_final(&self) -> bool {
        !matches!(self, FailureOutcome::RetryScheduled { .. })
    }
}

/// Attempt limit and exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt`: base, 2×base, 4×base...
    pub fn delay_after(&self, attempt: i32) -> Duration {
        let exponent = (attempt.max(1) - 1).min(20) as u32;
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    // Core identity
    pub job_type: String,
    pub reference_id: Uuid,
    #[builder(default, setter(strip_option))]
    pub run_id: Option<Uuid>,

    // Payload
    #[builder(default)]
    pub args: serde_json::Value,

    // Command-level idempotency
    #[builder(default, setter(strip_option))]
    pub idempotency_key: Option<String>,

    // State
    #[builder(default)]
    pub status: JobStatus,
    /// Attempts started so far; incremented on claim.
    #[builder(default = 0)]
    pub attempt: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default = Utc::now())]
    pub run_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    // Error tracking
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_kind: Option<ErrorKind>,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create an immediate one-time job (convenience constructor)
    pub fn immediate(reference_id: Uuid, job_type: &str) -> Self {
        Self::builder()
            .reference_id(reference_id)
            .job_type(job_type.to_string())
            .build()
    }

    /// Check if the job can be claimed at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.run_at <= now
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Decide what a failure of the current attempt leads to.
    pub fn failure_outcome(
        &self,
        kind: ErrorKind,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> FailureOutcome {
        if kind == ErrorKind::Cancelled {
            return FailureOutcome::Cancelled;
        }
        if kind.should_retry() && self.has_attempts_remaining() {
            let delay = chrono::Duration::from_std(policy.delay_after(self.attempt))
                .unwrap_or_else(|_| chrono::Duration::hours(1));
            return FailureOutcome::RetryScheduled {
                attempt: self.attempt,
                run_at: now + delay,
            };
        }
        FailureOutcome::Failed
    }
}

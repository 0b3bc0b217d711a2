use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::ErrorKind;

/// Job lifecycle events.
///
/// These events represent facts about the job lifecycle, not commands.
/// Observers subscribe through [`JobEvents`]; nothing in the pipeline
/// depends on an event being received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// A new job was stored.
    Enqueued {
        job_id: Uuid,
        job_type: String,
        run_id: Option<Uuid>,
    },

    /// An enqueue hit an active job with the same idempotency key.
    Deduplicated {
        job_id: Uuid,
        idempotency_key: String,
    },

    /// Job execution started.
    Started {
        job_id: Uuid,
        job_type: String,
        worker_id: String,
        attempt: i32,
    },

    /// Job completed successfully.
    Succeeded {
        job_id: Uuid,
        job_type: String,
        duration_ms: u64,
    },

    /// Attempt failed; the job will run again at `run_at`.
    RetryScheduled {
        job_id: Uuid,
        attempt: i32,
        error: String,
        run_at: chrono::DateTime<chrono::Utc>,
    },

    /// Job failed for good.
    Failed {
        job_id: Uuid,
        job_type: String,
        error: String,
        error_kind: ErrorKind,
        attempt: i32,
    },

    /// Job was cancelled.
    Cancelled {
        job_id: Uuid,
        reason: Option<String>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Enqueued { job_id, .. }
            | JobEvent::Deduplicated { job_id, .. }
            | JobEvent::Started { job_id, .. }
            | JobEvent::Succeeded { job_id, .. }
            | JobEvent::RetryScheduled { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast channel for [`JobEvent`]s.
///
/// Publishing never blocks and succeeds with no subscribers. Slow
/// subscribers lag and miss events rather than holding up workers.
#[derive(Clone)]
pub struct JobEvents {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_started_serializes() {
        let event = JobEvent::Started {
            job_id: Uuid::new_v4(),
            job_type: "section".to_string(),
            worker_id: "worker-1".to_string(),
            attempt: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Started"));
        assert!(json.contains("section"));
        assert!(json.contains("worker-1"));
    }

    #[test]
    fn event_failed_serializes_kind() {
        let event = JobEvent::Failed {
            job_id: Uuid::new_v4(),
            job_type: "faq".to_string(),
            error: "provider rejected key".to_string(),
            error_kind: ErrorKind::NonRetryable,
            attempt: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("non_retryable"));
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let events = JobEvents::default();
        let mut rx = events.subscribe();
        let job_id = Uuid::new_v4();

        events.publish(JobEvent::Cancelled {
            job_id,
            reason: None,
        });

        assert_eq!(rx.recv().await.unwrap().job_id(), job_id);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        JobEvents::default().publish(JobEvent::Cancelled {
            job_id: Uuid::new_v4(),
            reason: Some("run cancelled".to_string()),
        });
    }
}

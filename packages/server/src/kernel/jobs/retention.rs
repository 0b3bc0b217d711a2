//! Retention of finished jobs.
//!
//! Finished jobs are kept only for diagnostics. Succeeded and cancelled jobs
//! are dropped after a day or once more than `completed_max_count` newer ones
//! exist; failed jobs linger for a week.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::job::{Job, JobStatus};
use super::queue::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub completed_max_age: Duration,
    pub completed_max_count: usize,
    pub failed_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_age: Duration::from_secs(24 * 3600),
            completed_max_count: 1000,
            failed_max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl RetentionPolicy {
    pub fn completed_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - to_chrono(self.completed_max_age)
    }

    pub fn failed_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - to_chrono(self.failed_max_age)
    }

    /// Ids of the jobs in `jobs` this policy drops.
    pub fn expired<'a>(&self, jobs: impl IntoIterator<Item = &'a Job>, now: DateTime<Utc>) -> Vec<uuid::Uuid> {
        let completed_cutoff = self.completed_cutoff(now);
        let failed_cutoff = self.failed_cutoff(now);

        let mut completed: Vec<&Job> = Vec::new();
        let mut expired = Vec::new();

        for job in jobs {
            let finished_at = job.finished_at.unwrap_or(job.updated_at);
            match job.status {
                JobStatus::Succeeded | JobStatus::Cancelled => {
                    if finished_at < completed_cutoff {
                        expired.push(job.id);
                    } else {
                        completed.push(job);
                    }
                }
                JobStatus::Failed => {
                    if finished_at < failed_cutoff {
                        expired.push(job.id);
                    }
                }
                JobStatus::Pending | JobStatus::Running => {}
            }
        }

        // Newest first; everything past the cap goes.
        completed.sort_by(|a, b| {
            b.finished_at
                .unwrap_or(b.updated_at)
                .cmp(&a.finished_at.unwrap_or(a.updated_at))
        });
        expired.extend(
            completed
                .into_iter()
                .skip(self.completed_max_count)
                .map(|job| job.id),
        );

        expired
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Apply `policy` to `store` every `every` until `shutdown` fires.
pub async fn run_retention(
    store: Arc<dyn JobStore>,
    policy: RetentionPolicy,
    every: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_secs = every.as_secs(), "job retention task starting");
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                match store.prune(&policy, Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "pruned finished jobs"),
                    Err(e) => error!(error = %e, "job retention failed"),
                }
            }
        }
    }

    info!("job retention task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn finished(status: JobStatus, at: DateTime<Utc>) -> Job {
        let mut job = Job::immediate(Uuid::new_v4(), "faq");
        job.status = status;
        job.finished_at = Some(at);
        job
    }

    #[test]
    fn drops_old_completed_and_failed_jobs() {
        let now = Utc::now();
        let policy = RetentionPolicy::default();
        let old_ok = finished(JobStatus::Succeeded, now - chrono::Duration::hours(25));
        let fresh_ok = finished(JobStatus::Succeeded, now - chrono::Duration::hours(1));
        let failed_recent = finished(JobStatus::Failed, now - chrono::Duration::days(2));
        let failed_old = finished(JobStatus::Failed, now - chrono::Duration::days(8));
        let pending = Job::immediate(Uuid::new_v4(), "faq");

        let jobs = vec![old_ok.clone(), fresh_ok, failed_recent, failed_old.clone(), pending];
        let mut expired = policy.expired(&jobs, now);
        expired.sort();

        let mut expected = vec![old_ok.id, failed_old.id];
        expected.sort();
        assert_eq!(expired, expected);
    }

    #[test]
    fn caps_completed_jobs_keeping_newest() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            completed_max_count: 2,
            ..Default::default()
        };
        let jobs: Vec<Job> = (0..4)
            .map(|i| finished(JobStatus::Succeeded, now - chrono::Duration::minutes(i)))
            .collect();

        let expired = policy.expired(&jobs, now);
        assert_eq!(expired.len(), 2);
        assert!(expired.contains(&jobs[2].id));
        assert!(expired.contains(&jobs[3].id));
    }
}

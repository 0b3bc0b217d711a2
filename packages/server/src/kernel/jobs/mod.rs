//! Job infrastructure for background generation work.
//!
//! This module provides the kernel-level infrastructure for job execution:
//! - [`Job`] - Job model with status, attempts and backoff schedule
//! - [`JobStore`] - Storage contract, with [`MemoryJobStore`] and
//!   [`PostgresJobStore`] implementations
//! - [`JobWorker`] - Long-running service that claims and executes jobs
//! - [`JobEvents`] - Broadcast of [`JobEvent`] lifecycle facts
//! - [`RetentionPolicy`] - Pruning of finished jobs
//!
//! # Architecture
//!
//! ```text
//! Dispatcher.enqueue(request)
//!     │
//!     └─► JobStore.enqueue (deduplicated by idempotency key)
//!
//! JobWorker
//!     │
//!     ├─► JobStore.claim (attempt += 1)
//!     ├─► JobHandler.execute(job)
//!     └─► JobReporter.succeeded / failed (retry with backoff)
//! ```
//!
//! Business logic stays in domains; this module only moves jobs through
//! their lifecycle.

pub mod events;
mod job;
mod job_store;
mod memory;
mod queue;
pub mod retention;
mod worker;

pub use events::{JobEvent, JobEvents};
pub use job::{ErrorKind, FailureOutcome, Job, JobError, JobStatus, RetryPolicy};
pub use job_store::PostgresJobStore;
pub use memory::MemoryJobStore;
pub use queue::{EnqueueResult, JobCounts, JobStore};
pub use retention::{run_retention, RetentionPolicy};
pub use worker::{JobHandler, JobReporter, JobWorker, JobWorkerConfig};

//! Blog post generation domain.
//!
//! Requests for post content (introduction, sections, images, FAQ) become
//! deduplicated jobs. Workers run them through the research step chain and
//! store the written content; every post's pipeline run tracks progress
//! from NOT_STARTED to a terminal state.
//!
//! - `dispatcher` - enqueue, retry, cancellation and run bookkeeping
//! - `handler` - executes one job against the step chain
//! - `machines` - run state transitions (pure)
//! - `keys` - idempotency and artifact keys
//! - `stores` - run and post persistence

pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod keys;
pub mod machines;
pub mod models;
pub mod prompts;
pub mod stores;

pub use dispatcher::{DispatcherConfig, GenerationDispatcher, JobHandle};
pub use errors::DispatchError;
pub use handler::GenerationHandler;
pub use keys::ImageKeyStrategy;
pub use machines::{PipelineMachine, Transition};
pub use models::{Artifact, ContentJob, ContentType, GenerationRequest, PipelineRun, PipelineStatus};
pub use stores::{
    MemoryPostStore, MemoryRunStore, PostStore, PostgresPostStore, PostgresRunStore, RunStore,
};

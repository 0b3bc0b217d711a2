use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::Step;

/// Hook invoked by the step chain before each step starts.
///
/// Returning an error (normally [`PipelineError::Cancelled`]) stops the chain
/// before the step issues any external call. A step already running is never
/// interrupted.
///
/// [`PipelineError::Cancelled`]: crate::error::PipelineError::Cancelled
#[async_trait]
pub trait Checkpoint: Send + Sync {
    async fn before_step(&self, step: Step) -> Result<()>;
}

/// Checkpoint that never stops the chain.
pub struct NoCheckpoint;

#[async_trait]
impl Checkpoint for NoCheckpoint {
    async fn before_step(&self, _step: Step) -> Result<()> {
        Ok(())
    }
}

use async_trait::async_trait;

use crate::error::Result;

/// A text-generation provider (LLM chat completion).
///
/// Errors follow the pipeline taxonomy: network failures, 5xx and 429 are
/// [`Transient`](crate::error::PipelineError::Transient); bad credentials and
/// malformed responses are
/// [`Permanent`](crate::error::PipelineError::Permanent).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Provider name used in errors and logs.
    fn provider(&self) -> &str {
        "generator"
    }
}

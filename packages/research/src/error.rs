//! Typed errors for the research pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can decide
//! what to retry from the variant alone.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the executor, the step chain and its providers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid setup: zero rate limit, unknown content type, missing key.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure, provider 5xx or 429. Safe to retry.
    #[error("{provider} transient failure: {message}")]
    Transient { provider: String, message: String },

    /// Bad credentials or a malformed provider response.
    #[error("{provider} permanent failure: {message}")]
    Permanent { provider: String, message: String },

    /// A provider call exceeded its time allowance.
    #[error("{provider} call timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    /// A single query failed while gathering research.
    #[error("research for query '{query}' failed: {source}")]
    PartialResearch {
        query: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// The owning run was cancelled before the step started.
    #[error("cancelled before step '{step}'")]
    Cancelled { step: String },

    /// Generator output could not be interpreted.
    #[error("could not parse {what}: {reason}")]
    Parse { what: String, reason: String },
}

impl PipelineError {
    pub fn transient(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Permanent {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Whether a job failing with this error may be attempted again.
    ///
    /// Partial research failures inherit the retryability of the query
    /// that caused them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } | Self::Timeout { .. } => true,
            Self::PartialResearch { source, .. } => source.is_retryable(),
            Self::Configuration(_)
            | Self::Permanent { .. }
            | Self::Cancelled { .. }
            | Self::Parse { .. } => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse {
            what: "json".to_string(),
            reason: e.to_string(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

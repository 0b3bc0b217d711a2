//! Research-and-writing pipeline for long-form content.
//!
//! Turns an [`Interview`](types::Interview) into a post script through five
//! ordered steps: plan, gather, summarize, optimize, script. Outbound calls
//! to search and generation providers are throttled by shared rolling-window
//! limiters.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use research::{LimiterRegistry, Provider, StepChain, NoCheckpoint, TavilyWebSearcher};
//! use research::ai::OpenAiGenerator;
//!
//! let limiters = LimiterRegistry::new()
//!     .with_limit(Provider::Search, 5)?
//!     .with_limit(Provider::Generation, 3)?;
//!
//! let chain = StepChain::new(
//!     Arc::new(TavilyWebSearcher::new(tavily_key)),
//!     Arc::new(OpenAiGenerator::new(openai_key)),
//!     &limiters,
//! )?;
//!
//! let output = chain.run(&interview, &NoCheckpoint).await?;
//! println!("{}", output.script.body);
//! ```
//!
//! # Modules
//!
//! - [`throttle`] - Rolling-window rate limiter and per-provider registry
//! - [`pipeline`] - The step chain and its prompts
//! - [`cleaning`] - Markup cleaner for retrieved page text
//! - [`traits`] - Provider seams (search, generation, cleaning, checkpoints)
//! - [`types`] - Interview and stage output types
//! - [`testing`] - Mock providers

pub mod cleaning;
pub mod error;
pub mod pipeline;
pub mod security;
pub mod testing;
pub mod throttle;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

pub use cleaning::MarkupCleaner;
pub use error::{PipelineError, Result};
pub use pipeline::{optimize_serp, ChainConfig, ChainOutput, GatherPolicy, Step, StepChain};
pub use throttle::{throttled, LimiterRegistry, Provider, RateLimiter};
pub use traits::{Checkpoint, NoCheckpoint, TavilyWebSearcher, TextCleaner, TextGenerator, WebSearcher};
pub use types::{
    Interview, InterviewId, OptimizedResearch, PostId, ResearchPlan, ResearchResult, RunId, Script,
    SearchHit, Summary,
};

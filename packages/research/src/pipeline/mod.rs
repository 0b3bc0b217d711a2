//! The research-and-writing step chain.
//!
//! ```text
//! Interview
//!     │
//!     ├─► plan       build_research_plan   (1 generator call)
//!     ├─► gather     gather_research       (1 search call per query, throttled)
//!     ├─► summarize  summarize_research    (1 generator call per result, throttled)
//!     ├─► optimize   optimize_serp         (pure rerank)
//!     └─► script     generate_script       (1 generator call)
//! ```
//!
//! Steps run strictly in order. Each step is a transformation over its
//! explicit inputs, so re-running a step with the same inputs is safe.
//! Before each step the chain consults a [`Checkpoint`], which is how a
//! cancelled run stops between steps without interrupting one in flight.

mod gather;
mod optimize;
mod plan;
pub mod prompts;
mod script;
mod summarize;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cleaning::MarkupCleaner;
use crate::error::{PipelineError, Result};
use crate::throttle::{LimiterRegistry, Provider, RateLimiter};
use crate::traits::{Checkpoint, TextCleaner, TextGenerator, WebSearcher};
use crate::types::{Interview, OptimizedResearch, ResearchPlan, ResearchResult, Script, Summary};

pub use gather::GatherPolicy;
pub use optimize::{optimize_serp, MIN_RELEVANCE};
pub use plan::parse_queries;
pub use script::parse_outline;
pub use summarize::MAX_SUMMARY_CHARS;

/// The five stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Plan,
    Gather,
    Summarize,
    Optimize,
    Script,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Plan,
        Step::Gather,
        Step::Summarize,
        Step::Optimize,
        Step::Script,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::Plan => "plan",
            Step::Gather => "gather",
            Step::Summarize => "summarize",
            Step::Optimize => "optimize",
            Step::Script => "script",
        }
    }

    /// Human-readable status label shown while the step runs.
    pub fn label(&self) -> &'static str {
        match self {
            Step::Plan => "Building research plan",
            Step::Gather => "Gathering research",
            Step::Summarize => "Summarizing research",
            Step::Optimize => "Optimizing search results",
            Step::Script => "Generating script",
        }
    }

    /// Zero-based position in [`Step::ALL`].
    pub fn index(&self) -> usize {
        Step::ALL.iter().position(|s| s == self).unwrap_or(0)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables for one chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub results_per_query: usize,
    pub gather_policy: GatherPolicy,
    pub search_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            results_per_query: 5,
            gather_policy: GatherPolicy::FailFast,
            search_timeout: Duration::from_secs(20),
            generation_timeout: Duration::from_secs(120),
        }
    }
}

/// Every intermediate product of a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutput {
    pub plan: ResearchPlan,
    pub results: Vec<ResearchResult>,
    pub summaries: Vec<Summary>,
    pub optimized: OptimizedResearch,
    pub script: Script,
}

/// Providers, limiters and settings shared by the steps.
///
/// Limiters come from a [`LimiterRegistry`] so that every chain in the
/// process throttles against the same windows.
#[derive(Clone)]
pub struct StepChain {
    searcher: Arc<dyn WebSearcher>,
    generator: Arc<dyn TextGenerator>,
    cleaner: Arc<dyn TextCleaner>,
    search_limiter: Arc<RateLimiter>,
    generation_limiter: Arc<RateLimiter>,
    config: ChainConfig,
}

impl StepChain {
    pub fn new(
        searcher: Arc<dyn WebSearcher>,
        generator: Arc<dyn TextGenerator>,
        limiters: &LimiterRegistry,
    ) -> Result<Self> {
        Ok(Self {
            searcher,
            generator,
            cleaner: Arc::new(MarkupCleaner::new()),
            search_limiter: limiters.get(Provider::Search)?,
            generation_limiter: limiters.get(Provider::Generation)?,
            config: ChainConfig::default(),
        })
    }

    pub fn with_cleaner(mut self, cleaner: Arc<dyn TextCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn with_config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    pub fn generation_limiter(&self) -> &Arc<RateLimiter> {
        &self.generation_limiter
    }

    /// Run all five steps, consulting `checkpoint` before each.
    pub async fn run(&self, interview: &Interview, checkpoint: &dyn Checkpoint) -> Result<ChainOutput> {
        checkpoint.before_step(Step::Plan).await?;
        let plan = self.build_research_plan(interview).await?;
        info!(interview_id = %interview.id, queries = plan.len(), "research plan ready");

        checkpoint.before_step(Step::Gather).await?;
        let results = self.gather_research(&plan).await?;
        info!(interview_id = %interview.id, results = results.len(), "research gathered");

        checkpoint.before_step(Step::Summarize).await?;
        let summaries = self.summarize_research(interview, &results).await?;

        checkpoint.before_step(Step::Optimize).await?;
        let optimized = self.optimize_serp(interview, &summaries);
        info!(
            interview_id = %interview.id,
            summarized = summaries.len(),
            kept = optimized.len(),
            "research optimized"
        );

        checkpoint.before_step(Step::Script).await?;
        let script = self.generate_script(interview, &optimized).await?;

        Ok(ChainOutput {
            plan,
            results,
            summaries,
            optimized,
            script,
        })
    }

    /// One generator call, throttled and bounded by the generation timeout.
    pub async fn generate(&self, system: &str, user: &str) -> Result<String> {
        self.generation_limiter.acquire().await;
        with_timeout(
            self.generator.provider(),
            self.config.generation_timeout,
            self.generator.complete(system, user),
        )
        .await
    }
}

/// Bound a provider call; running out of time is a transient failure.
pub async fn with_timeout<T>(
    provider: &str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout {
            provider: provider.to_string(),
            after,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_ordered() {
        let indexes: Vec<usize> = Step::ALL.iter().map(Step::index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
        assert_eq!(Step::Gather.label(), "Gathering research");
    }

    #[tokio::test]
    async fn timeouts_are_transient() {
        let err = with_timeout("search", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, PipelineError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { .. }));
        assert!(err.is_retryable());
    }
}

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{with_timeout, StepChain};
use crate::error::{PipelineError, Result};
use crate::types::{ResearchPlan, ResearchResult, SearchHit};

/// What to do when a single query fails while gathering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatherPolicy {
    /// Abort the whole step on the first failing query.
    #[default]
    FailFast,
    /// Keep going; the failed query is kept as an explicit skip marker.
    BestEffort,
}

impl FromStr for GatherPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" => Ok(GatherPolicy::FailFast),
            "best_effort" | "best-effort" => Ok(GatherPolicy::BestEffort),
            other => Err(PipelineError::Configuration(format!(
                "unknown gather policy '{}'",
                other
            ))),
        }
    }
}

impl StepChain {
    /// Step 2: one search per planned query through the shared search limiter.
    ///
    /// Results come back in plan order. Page text is cleaned before it is
    /// handed on; hits that clean down to nothing are dropped.
    pub async fn gather_research(&self, plan: &ResearchPlan) -> Result<Vec<ResearchResult>> {
        let policy = self.config.gather_policy;
        let queries = plan.queries().iter().cloned().enumerate();

        self.search_limiter
            .run(queries, |(position, query)| async move {
                match self.search_one(&query).await {
                    Ok(hits) => Ok(ResearchResult {
                        query,
                        position,
                        hits,
                        skipped: None,
                    }),
                    Err(e) if policy == GatherPolicy::BestEffort => {
                        warn!(query = %query, position, error = %e, "skipping failed research query");
                        Ok(ResearchResult::skipped(query, position, e.to_string()))
                    }
                    Err(e) => Err(PipelineError::PartialResearch {
                        query,
                        source: Box::new(e),
                    }),
                }
            })
            .await
    }

    async fn search_one(&self, query: &str) -> Result<Vec<SearchHit>> {
        let hits = with_timeout(
            self.searcher.provider(),
            self.config.search_timeout,
            self.searcher.search(query, self.config.results_per_query),
        )
        .await?;

        Ok(hits
            .into_iter()
            .filter_map(|mut hit| {
                hit.text = self.cleaner.clean(&hit.text);
                (!hit.text.is_empty()).then_some(hit)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policies() {
        assert_eq!("fail_fast".parse::<GatherPolicy>().unwrap(), GatherPolicy::FailFast);
        assert_eq!("Best-Effort".parse::<GatherPolicy>().unwrap(), GatherPolicy::BestEffort);
        assert!("sometimes".parse::<GatherPolicy>().is_err());
    }
}

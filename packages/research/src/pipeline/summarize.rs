use tracing::debug;

use super::prompts::{format_summarize_prompt, SUMMARIZE_SYSTEM};
use super::{with_timeout, StepChain};
use crate::error::Result;
use crate::types::{Interview, ResearchResult, Summary};

/// Upper bound on the length of one abstract, in characters.
pub const MAX_SUMMARY_CHARS: usize = 1200;

impl StepChain {
    /// Step 3: one bounded abstract per research result, in the same order.
    ///
    /// Skipped and empty results keep their slot with an empty abstract and
    /// cost no generator call.
    pub async fn summarize_research(
        &self,
        interview: &Interview,
        results: &[ResearchResult],
    ) -> Result<Vec<Summary>> {
        self.generation_limiter
            .run(results, |result| async move {
                let mut summary = Summary {
                    query: result.query.clone(),
                    position: result.position,
                    text: String::new(),
                    sources: result.hits.iter().map(|h| h.metadata.clone()).collect(),
                    search_score: result.top_score(),
                    skipped: result.is_skipped(),
                };

                if summary.skipped || result.hits.is_empty() {
                    debug!(query = %result.query, "nothing to summarize");
                    return Ok(summary);
                }

                let text = with_timeout(
                    self.generator.provider(),
                    self.config.generation_timeout,
                    self.generator
                        .complete(SUMMARIZE_SYSTEM, &format_summarize_prompt(interview, result)),
                )
                .await?;
                summary.text = truncate_chars(text.trim(), MAX_SUMMARY_CHARS);

                Ok(summary)
            })
            .await
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

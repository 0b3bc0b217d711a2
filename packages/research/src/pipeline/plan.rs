use serde_json::Value;
use tracing::debug;

use super::prompts::{format_plan_prompt, PLAN_SYSTEM};
use super::StepChain;
use crate::error::{PipelineError, Result};
use crate::types::{Interview, ResearchPlan};

impl StepChain {
    /// Step 1: ask the generator for search queries and normalize them.
    pub async fn build_research_plan(&self, interview: &Interview) -> Result<ResearchPlan> {
        if interview.main_keyword.trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "interview {} has no main keyword",
                interview.id
            )));
        }

        let response = self.generate(PLAN_SYSTEM, &format_plan_prompt(interview)).await?;
        let candidates = parse_queries(&response);
        debug!(interview_id = %interview.id, candidates = candidates.len(), "plan candidates parsed");

        Ok(ResearchPlan::from_candidates(&interview.main_keyword, candidates))
    }
}

/// Pull query strings out of a generator response.
///
/// Accepts a JSON array, a JSON object with a `queries` array (optionally
/// inside a markdown code fence) or, failing both, one query per line.
pub fn parse_queries(response: &str) -> Vec<String> {
    let trimmed = strip_code_fence(response.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let array = match &value {
            Value::Array(items) => Some(items),
            Value::Object(map) => map.get("queries").and_then(Value::as_array),
            _ => None,
        };
        if let Some(items) = array {
            return items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('[') && !line.starts_with(']'))
        .map(|line| line.trim_end_matches(',').to_string())
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

use chrono::Utc;
use tracing::warn;

use super::prompts::{format_script_prompt, hash_prompt, SCRIPT_SYSTEM};
use super::StepChain;
use crate::error::{PipelineError, Result};
use crate::types::{Interview, OptimizedResearch, Script};

impl StepChain {
    /// Step 5: write the post script from the optimized research.
    pub async fn generate_script(
        &self,
        interview: &Interview,
        research: &OptimizedResearch,
    ) -> Result<Script> {
        if research.is_empty() {
            warn!(interview_id = %interview.id, "generating script without research");
        }

        let user = format_script_prompt(interview, research);
        let body = self.generate(SCRIPT_SYSTEM, &user).await?;
        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(PipelineError::permanent(
                self.generator.provider(),
                "empty script response",
            ));
        }

        let (title, outline) = parse_outline(&body);

        Ok(Script {
            title: title.unwrap_or_else(|| interview.main_keyword.trim().to_string()),
            outline,
            body,
            language: interview.language.clone(),
            sources: research.source_urls(),
            prompt_hash: hash_prompt(SCRIPT_SYSTEM, &user),
            generated_at: Utc::now(),
        })
    }
}

/// Title (`# ...`) and section headings (`## ...`) of a markdown script.
pub fn parse_outline(markdown: &str) -> (Option<String>, Vec<String>) {
    let mut title = None;
    let mut outline = Vec::new();

    for line in markdown.lines().map(str::trim) {
        if let Some(heading) = line.strip_prefix("## ") {
            let heading = heading.trim();
            if !heading.is_empty() {
                outline.push(heading.to_string());
            }
        } else if let Some(heading) = line.strip_prefix("# ") {
            if title.is_none() && !heading.trim().is_empty() {
                title = Some(heading.trim().to_string());
            }
        }
    }

    (title, outline)
}

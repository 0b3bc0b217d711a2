//! LLM prompts for the step chain.
//!
//! Prompt shapes are fixed: the same interview always yields the same prompt
//! text, so prompt hashes identify what produced a script.

use sha2::{Digest, Sha256};

use crate::types::{Interview, OptimizedResearch, ResearchResult};

/// Characters of page text sent per source when summarizing.
const SOURCE_EXCERPT_CHARS: usize = 4000;

pub const PLAN_SYSTEM: &str = r#"You are an SEO research planner.
Given a content brief, write the web searches a researcher would run before writing the article.

Rules:
- Write between 8 and 15 queries, as real users would type them.
- Write the queries in the article language.
- Cover definitions, how-to intent, comparisons, statistics and common questions.
- Do not number the queries.

Output a JSON array of strings:
["query one", "query two", ...]"#;

const PLAN_USER: &str = r#"Main keyword: {main_keyword}
Secondary keywords: {secondary_keywords}
Language: {language}
Brand: {brand}
Description:
{description}"#;

pub const SUMMARIZE_SYSTEM: &str = r#"You condense web research for a writer.
Summarize the sources below in at most 150 words.
Keep facts, figures, names and dates that matter for the main keyword. Drop navigation text, ads and anything unrelated.
Answer in the article language. Output plain text only."#;

const SUMMARIZE_USER: &str = r#"Main keyword: {main_keyword}
Language: {language}
Search query: {query}

Sources:
{sources}"#;

pub const SCRIPT_SYSTEM: &str = r#"You are a senior content strategist writing the script for a blog post.
Use the research provided; do not invent statistics.

Output markdown:
# <post title>
Short paragraph describing the angle of the post.
## <section heading>
Bullet notes the writer should cover in this section, citing sources by number.
(repeat for every section)"#;

const SCRIPT_USER: &str = r#"Main keyword: {main_keyword}
Secondary keywords: {secondary_keywords}
Language: {language}
Tone: {tone}
Length: {min_words}-{max_words} words
Brand mention: {brand}
Include FAQ section: {faq}
Internal links: {internal_links}
External links: {external_links}
Brief:
{description}

Research (most relevant first):
{research}"#;

fn or_none(value: &str) -> &str {
    if value.trim().is_empty() {
        "none"
    } else {
        value
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub fn format_plan_prompt(interview: &Interview) -> String {
    PLAN_USER
        .replace("{main_keyword}", interview.main_keyword.trim())
        .replace("{secondary_keywords}", or_none(&interview.secondary_keywords.join(", ")))
        .replace("{language}", &interview.language)
        .replace("{brand}", or_none(interview.brand.as_deref().unwrap_or("")))
        .replace("{description}", or_none(&interview.description))
}

pub fn format_summarize_prompt(interview: &Interview, result: &ResearchResult) -> String {
    let sources = result
        .hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let excerpt: String = hit.text.chars().take(SOURCE_EXCERPT_CHARS).collect();
            format!("[{}] {}\n{}\n", i + 1, hit.metadata.url, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n");

    SUMMARIZE_USER
        .replace("{main_keyword}", interview.main_keyword.trim())
        .replace("{language}", &interview.language)
        .replace("{query}", &result.query)
        .replace("{sources}", &sources)
}

pub fn format_script_prompt(interview: &Interview, research: &OptimizedResearch) -> String {
    let research_text = if research.is_empty() {
        "No research available.".to_string()
    } else {
        research
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let urls: Vec<&str> = entry.summary.sources.iter().map(|s| s.url.as_str()).collect();
                format!(
                    "{}. ({}) {}\nSources: {}",
                    i + 1,
                    entry.summary.query,
                    entry.summary.text,
                    urls.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    SCRIPT_USER
        .replace("{main_keyword}", interview.main_keyword.trim())
        .replace("{secondary_keywords}", or_none(&interview.secondary_keywords.join(", ")))
        .replace("{language}", &interview.language)
        .replace("{tone}", &interview.tone)
        .replace("{min_words}", &interview.word_count.min.to_string())
        .replace("{max_words}", &interview.word_count.max.to_string())
        .replace("{brand}", or_none(interview.brand.as_deref().unwrap_or("")))
        .replace("{faq}", yes_no(interview.include_faq))
        .replace("{internal_links}", yes_no(interview.internal_links))
        .replace("{external_links}", yes_no(interview.external_links))
        .replace("{description}", or_none(&interview.description))
        .replace("{research}", &research_text)
}

/// SHA-256 of a system/user prompt pair.
pub fn hash_prompt(system: &str, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update([0u8]);
    hasher.update(user.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interview() -> Interview {
        Interview::new("online marketing")
            .with_secondary_keywords(["digital marketing"])
            .with_language("es")
    }

    #[test]
    fn plan_prompt_is_deterministic() {
        let a = interview();
        let mut b = a.clone();
        b.id = crate::types::InterviewId::new();

        assert_eq!(format_plan_prompt(&a), format_plan_prompt(&b));
    }

    #[test]
    fn plan_prompt_fills_every_placeholder() {
        let prompt = format_plan_prompt(&interview());
        assert!(prompt.contains("Main keyword: online marketing"));
        assert!(prompt.contains("Secondary keywords: digital marketing"));
        assert!(prompt.contains("Brand: none"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = hash_prompt(SCRIPT_SYSTEM, "user");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_prompt(SCRIPT_SYSTEM, "user"));
        assert_ne!(hash, hash_prompt(SCRIPT_SYSTEM, "other"));
    }
}

//! Prompts for writing post content from a finished script.

use serde::Serialize;

use research::{Interview, Script};

use super::models::ContentJob;

pub const INTRODUCTION_SYSTEM: &str = r#"You write the opening of a blog post.
Hook the reader in the first sentence, state what the post covers and why it matters to them.
Use the main keyword naturally once. Between 80 and 150 words.
Write in the article language and tone. Output markdown paragraphs only, no heading."#;

pub const SECTION_SYSTEM: &str = r#"You write one section of a blog post from the writer's notes.
Cover every note, in order, and keep claims tied to the cited sources.
Start with the section heading as a level-2 markdown heading.
Write in the article language and tone. Stay within the word budget."#;

pub const FAQ_SYSTEM: &str = r#"You write the FAQ block that closes a blog post.
Write between 4 and 6 questions readers actually search for, each answered in 2-3 sentences.
Do not repeat the body of the post.

Output markdown:
## <FAQ heading in the article language>
### <question>
<answer>
(repeat)"#;

pub const IMAGE_SYSTEM: &str = r#"You brief an illustrator for a blog post image.
Rewrite the request as a single, concrete image description: subject, setting, composition, style.
No text or logos in the image. One paragraph, in English."#;

/// Image brief stored as the artifact of an image job.
#[derive(Debug, Clone, Serialize)]
pub struct ImageBrief<'a> {
    pub request: &'a str,
    pub section: Option<&'a str>,
    pub style: Option<&'a str>,
    pub prompt: String,
    pub alt_text: String,
}

/// System and user prompt for a content job.
pub fn content_prompt(job: &ContentJob, interview: &Interview, script: &Script) -> (&'static str, String) {
    match job {
        ContentJob::Introduction => (INTRODUCTION_SYSTEM, introduction(interview, script)),
        ContentJob::Section { title } => (SECTION_SYSTEM, section(interview, script, title)),
        ContentJob::Faq => (FAQ_SYSTEM, faq(interview, script)),
        ContentJob::Image { prompt, section } => {
            (IMAGE_SYSTEM, image(interview, script, prompt, section.as_deref()))
        }
    }
}

fn introduction(interview: &Interview, script: &Script) -> String {
    format!(
        "Post title: {title}\n\
         Main keyword: {keyword}\n\
         Language: {language}\n\
         Tone: {tone}\n\
         Brand: {brand}\n\
         Sections:\n{outline}\n\n\
         Script:\n{body}",
        title = script.title,
        keyword = interview.main_keyword,
        language = interview.language,
        tone = interview.tone,
        brand = interview.brand.as_deref().unwrap_or("none"),
        outline = bullet_list(&script.outline),
        body = script.body,
    )
}

fn section(interview: &Interview, script: &Script, title: &str) -> String {
    let notes = script
        .section_notes(title)
        .filter(|notes| !notes.is_empty())
        .unwrap_or("No notes for this heading; follow the overall script.");

    format!(
        "Section: {title}\n\
         Post title: {post_title}\n\
         Main keyword: {keyword}\n\
         Secondary keywords: {secondary}\n\
         Language: {language}\n\
         Tone: {tone}\n\
         Word budget: {budget}\n\
         Notes:\n{notes}\n\n\
         Sources:\n{sources}",
        title = title.trim(),
        post_title = script.title,
        keyword = interview.main_keyword,
        secondary = interview.secondary_keywords.join(", "),
        language = interview.language,
        tone = interview.tone,
        budget = section_budget(interview, script),
        notes = notes,
        sources = numbered_list(&script.sources),
    )
}

fn faq(interview: &Interview, script: &Script) -> String {
    format!(
        "FAQ for: {title}\n\
         Main keyword: {keyword}\n\
         Secondary keywords: {secondary}\n\
         Language: {language}\n\
         Tone: {tone}\n\
         Sections already covered:\n{outline}",
        title = script.title,
        keyword = interview.main_keyword,
        secondary = interview.secondary_keywords.join(", "),
        language = interview.language,
        tone = interview.tone,
        outline = bullet_list(&script.outline),
    )
}

fn image(interview: &Interview, script: &Script, request: &str, section: Option<&str>) -> String {
    format!(
        "Image request: {request}\n\
         Post title: {title}\n\
         Section: {section}\n\
         Style: {style}\n\
         Main keyword: {keyword}",
        request = request.trim(),
        title = script.title,
        section = section.unwrap_or("none"),
        style = interview.images.style.as_deref().unwrap_or("editorial photo"),
        keyword = interview.main_keyword,
    )
}

/// Words per section, splitting the upper bound of the requested length.
fn section_budget(interview: &Interview, script: &Script) -> u32 {
    let sections = script.outline.len().max(1) as u32;
    (interview.word_count.max / sections).max(100)
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn numbered_list(items: &[String]) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("[{}] {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Alt text for an image brief: the first sentence of the refined prompt.
pub fn alt_text(prompt: &str) -> String {
    let first = prompt
        .split_terminator(['.', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(prompt.trim());
    first.chars().take(125).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use research::testing::sample_interview;

    fn script() -> Script {
        Script {
            title: "Guía de online marketing".to_string(),
            outline: vec!["Qué es".to_string(), "Primeros pasos".to_string()],
            body: "# Guía de online marketing\nIntro.\n## Qué es\n- definición [1]\n## Primeros pasos\n- pasos [2]".to_string(),
            language: "es".to_string(),
            sources: vec!["https://example.com/a".to_string()],
            prompt_hash: "abc".to_string(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn section_prompt_carries_its_notes() {
        let (system, user) = content_prompt(&ContentJob::section("Qué es"), &sample_interview(), &script());
        assert_eq!(system, SECTION_SYSTEM);
        assert!(user.starts_with("Section: Qué es"));
        assert!(user.contains("- definición [1]"));
        assert!(!user.contains("- pasos [2]"));
        assert!(user.contains("[1] https://example.com/a"));
    }

    #[test]
    fn unknown_heading_falls_back_to_script() {
        let (_, user) = content_prompt(&ContentJob::section("Precios"), &sample_interview(), &script());
        assert!(user.contains("No notes for this heading"));
    }

    #[test]
    fn each_content_type_has_its_own_system_prompt() {
        let interview = sample_interview();
        let script = script();
        let systems: Vec<&str> = [
            ContentJob::Introduction,
            ContentJob::section("Qué es"),
            ContentJob::Faq,
            ContentJob::image("a laptop"),
        ]
        .iter()
        .map(|job| content_prompt(job, &interview, &script).0)
        .collect();

        for (i, a) in systems.iter().enumerate() {
            for b in &systems[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn alt_text_is_first_sentence() {
        assert_eq!(alt_text("A laptop on a desk. Soft light."), "A laptop on a desk");
        assert_eq!(alt_text("  "), "");
    }
}

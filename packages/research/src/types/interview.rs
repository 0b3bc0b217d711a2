//! The interview: a structured brief for one blog post.

use serde::{Deserialize, Serialize};

use super::id::InterviewId;

/// Bounds on the length of the finished post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRange {
    pub min: u32,
    pub max: u32,
}

impl Default for WordRange {
    fn default() -> Self {
        Self { min: 1200, max: 1800 }
    }
}

/// How images for the post should be produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub style: Option<String>,
}

/// Input record for the pipeline. Read-only once a run has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interview {
    #[serde(default)]
    pub id: InterviewId,
    pub main_keyword: String,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default)]
    pub word_count: WordRange,
    #[serde(default)]
    pub include_faq: bool,
    /// Brand to mention in the post, if any.
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub internal_links: bool,
    #[serde(default)]
    pub external_links: bool,
    #[serde(default)]
    pub images: ImageConfig,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_tone() -> String {
    "informative".to_string()
}

impl Interview {
    pub fn new(main_keyword: impl Into<String>) -> Self {
        Self {
            id: InterviewId::new(),
            main_keyword: main_keyword.into(),
            secondary_keywords: Vec::new(),
            description: String::new(),
            language: default_language(),
            tone: default_tone(),
            word_count: WordRange::default(),
            include_faq: false,
            brand: None,
            internal_links: false,
            external_links: false,
            images: ImageConfig::default(),
        }
    }

    pub fn with_secondary_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secondary_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_word_count(mut self, min: u32, max: u32) -> Self {
        self.word_count = WordRange { min, max };
        self
    }

    pub fn with_faq(mut self, include: bool) -> Self {
        self.include_faq = include;
        self
    }

    /// Main keyword followed by secondary keywords, trimmed and non-empty.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.main_keyword.as_str())
            .chain(self.secondary_keywords.iter().map(String::as_str))
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let interview: Interview = serde_json::from_str(
            r#"{"main_keyword": "online marketing", "secondary_keywords": ["digital marketing"], "language": "es"}"#,
        )
        .unwrap();

        assert_eq!(interview.language, "es");
        assert_eq!(interview.tone, "informative");
        assert_eq!(interview.word_count, WordRange::default());
        assert!(!interview.include_faq);
    }

    #[test]
    fn keywords_skip_blanks() {
        let interview = Interview::new("seo").with_secondary_keywords(["  ", "link building"]);
        let keywords: Vec<_> = interview.keywords().collect();
        assert_eq!(keywords, vec!["seo", "link building"]);
    }
}

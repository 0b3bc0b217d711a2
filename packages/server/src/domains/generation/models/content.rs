use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use research::PostId;

use crate::domains::generation::errors::DispatchError;

/// The closed set of content units a post is generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Introduction,
    Section,
    Image,
    Faq,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Introduction,
        ContentType::Section,
        ContentType::Image,
        ContentType::Faq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Introduction => "introduction",
            ContentType::Section => "section",
            ContentType::Image => "image",
            ContentType::Faq => "faq",
        }
    }

    /// Run label while this content is being written.
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Introduction => "Writing introduction",
            ContentType::Section => "Writing section",
            ContentType::Image => "Preparing image brief",
            ContentType::Faq => "Writing FAQ",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "introduction" => Ok(ContentType::Introduction),
            "section" => Ok(ContentType::Section),
            "image" => Ok(ContentType::Image),
            "faq" => Ok(ContentType::Faq),
            _ => Err(DispatchError::UnknownContentType(s.to_string())),
        }
    }
}

/// One unit of content with its type-specific payload.
///
/// Stored as the job's `args`, tagged by `content_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum ContentJob {
    Introduction,
    Section {
        title: String,
    },
    Image {
        prompt: String,
        #[serde(default)]
        section: Option<String>,
    },
    Faq,
}

#[derive(Deserialize)]
struct SectionPayload {
    title: String,
}

#[derive(Deserialize)]
struct ImagePayload {
    prompt: String,
    #[serde(default)]
    section: Option<String>,
}

impl ContentJob {
    pub fn content_type(&self) -> ContentType {
        match self {
            ContentJob::Introduction => ContentType::Introduction,
            ContentJob::Section { .. } => ContentType::Section,
            ContentJob::Image { .. } => ContentType::Image,
            ContentJob::Faq => ContentType::Faq,
        }
    }

    pub fn section(title: impl Into<String>) -> Self {
        ContentJob::Section {
            title: title.into(),
        }
    }

    pub fn image(prompt: impl Into<String>) -> Self {
        ContentJob::Image {
            prompt: prompt.into(),
            section: None,
        }
    }

    /// Build a job from an untyped tag and payload.
    ///
    /// The tag is checked first, so an unknown type fails regardless of the
    /// payload.
    pub fn parse(content_type: &str, payload: serde_json::Value) -> Result<Self, DispatchError> {
        let content_type: ContentType = content_type.parse()?;
        let invalid = |reason: String| DispatchError::InvalidPayload {
            content_type,
            reason,
        };

        match content_type {
            ContentType::Introduction => Ok(ContentJob::Introduction),
            ContentType::Faq => Ok(ContentJob::Faq),
            ContentType::Section => {
                let payload: SectionPayload =
                    serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))?;
                let title = payload.title.trim();
                if title.is_empty() {
                    return Err(invalid("title must not be empty".to_string()));
                }
                Ok(ContentJob::section(title))
            }
            ContentType::Image => {
                let payload: ImagePayload =
                    serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))?;
                let prompt = payload.prompt.trim();
                if prompt.is_empty() {
                    return Err(invalid("prompt must not be empty".to_string()));
                }
                Ok(ContentJob::Image {
                    prompt: prompt.to_string(),
                    section: payload.section.filter(|s| !s.trim().is_empty()),
                })
            }
        }
    }
}

/// A request to generate one unit of content for a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub post_id: PostId,
    pub job: ContentJob,
}

impl GenerationRequest {
    pub fn new(post_id: PostId, job: ContentJob) -> Self {
        Self { post_id, job }
    }

    pub fn parse(
        post_id: PostId,
        content_type: &str,
        payload: serde_json::Value,
    ) -> Result<Self, DispatchError> {
        Ok(Self::new(post_id, ContentJob::parse(content_type, payload)?))
    }

    pub fn content_type(&self) -> ContentType {
        self.job.content_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_tags() {
        for content_type in ContentType::ALL {
            assert_eq!(content_type.as_str().parse::<ContentType>().unwrap(), content_type);
        }
        assert_eq!(" FAQ ".parse::<ContentType>().unwrap(), ContentType::Faq);
    }

    #[test]
    fn unknown_tag_is_a_configuration_error() {
        let err = ContentJob::parse("video", json!({ "title": "x" })).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownContentType(ref t) if t == "video"));
        assert!(err.is_configuration());
    }

    #[test]
    fn section_requires_a_title() {
        let job = ContentJob::parse("section", json!({ "title": "  Why it matters " })).unwrap();
        assert_eq!(job, ContentJob::section("Why it matters"));

        let err = ContentJob::parse("section", json!({})).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidPayload {
                content_type: ContentType::Section,
                ..
            }
        ));
        assert!(ContentJob::parse("section", json!({ "title": " " })).is_err());
    }

    #[test]
    fn introduction_ignores_payload() {
        let job = ContentJob::parse("introduction", serde_json::Value::Null).unwrap();
        assert_eq!(job, ContentJob::Introduction);
    }

    #[test]
    fn job_args_are_tagged() {
        let value = serde_json::to_value(ContentJob::image("a laptop on a desk")).unwrap();
        assert_eq!(value["content_type"], "image");
        assert_eq!(value["prompt"], "a laptop on a desk");

        let back: ContentJob = serde_json::from_value(json!({ "content_type": "faq" })).unwrap();
        assert_eq!(back, ContentJob::Faq);
    }
}

//! Idempotency keys for generation jobs.
//!
//! A key names one unit of work for one post. While a job with the key is
//! pending or running, enqueueing the same key returns that job.
//!
//! | content      | key                                   |
//! |--------------|---------------------------------------|
//! | introduction | `introduction:{post}`                 |
//! | faq          | `faq:{post}`                          |
//! | section      | `section:{post}:{normalized title}`   |
//! | image        | `image:{post}:{timestamp or hash}`    |

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use research::{PipelineError, PostId};

use super::models::ContentJob;

/// How image jobs are told apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageKeyStrategy {
    /// Every request is a new image.
    #[default]
    Timestamp,
    /// Requests with the same prompt for the same post deduplicate.
    PromptHash,
}

impl FromStr for ImageKeyStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(ImageKeyStrategy::Timestamp),
            "prompt_hash" | "prompt-hash" => Ok(ImageKeyStrategy::PromptHash),
            other => Err(PipelineError::Configuration(format!(
                "unknown image key strategy '{}'",
                other
            ))),
        }
    }
}

pub fn idempotency_key(
    post_id: PostId,
    job: &ContentJob,
    images: ImageKeyStrategy,
    now: DateTime<Utc>,
) -> String {
    match job {
        ContentJob::Introduction => format!("introduction:{}", post_id),
        ContentJob::Faq => format!("faq:{}", post_id),
        ContentJob::Section { title } => format!("section:{}:{}", post_id, normalize(title)),
        ContentJob::Image { prompt, .. } => match images {
            ImageKeyStrategy::Timestamp => {
                format!("image:{}:{}", post_id, now.timestamp_micros())
            }
            ImageKeyStrategy::PromptHash => {
                format!("image:{}:{}", post_id, prompt_hash(prompt))
            }
        },
    }
}

/// Key under which a job's output is stored for its post.
///
/// Images use the full job key so repeated requests keep separate
/// artifacts.
pub fn artifact_key(job: &ContentJob, idempotency_key: Option<&str>) -> String {
    match job {
        ContentJob::Introduction => "introduction".to_string(),
        ContentJob::Faq => "faq".to_string(),
        ContentJob::Section { title } => format!("section:{}", normalize(title)),
        ContentJob::Image { prompt, .. } => match idempotency_key.and_then(|k| k.rsplit(':').next()) {
            Some(suffix) => format!("image:{}", suffix),
            None => format!("image:{}", prompt_hash(prompt)),
        },
    }
}

fn normalize(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(prompt).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faq_and_introduction_keys_differ() {
        let post = PostId::new();
        let now = Utc::now();
        let intro = idempotency_key(post, &ContentJob::Introduction, ImageKeyStrategy::default(), now);
        let faq = idempotency_key(post, &ContentJob::Faq, ImageKeyStrategy::default(), now);

        assert_ne!(intro, faq);
        assert!(intro.starts_with("introduction:"));
    }

    #[test]
    fn section_titles_are_normalized() {
        let post = PostId::new();
        let now = Utc::now();
        let a = idempotency_key(post, &ContentJob::section("Getting  Started"), ImageKeyStrategy::Timestamp, now);
        let b = idempotency_key(post, &ContentJob::section("getting started"), ImageKeyStrategy::Timestamp, now);
        let c = idempotency_key(post, &ContentJob::section("Pricing"), ImageKeyStrategy::Timestamp, now);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn keys_are_scoped_to_the_post() {
        let now = Utc::now();
        let a = idempotency_key(PostId::new(), &ContentJob::Faq, ImageKeyStrategy::Timestamp, now);
        let b = idempotency_key(PostId::new(), &ContentJob::Faq, ImageKeyStrategy::Timestamp, now);
        assert_ne!(a, b);
    }

    #[test]
    fn image_strategies() {
        let post = PostId::new();
        let job = ContentJob::image("A desk with a laptop");
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(5);

        assert_ne!(
            idempotency_key(post, &job, ImageKeyStrategy::Timestamp, earlier),
            idempotency_key(post, &job, ImageKeyStrategy::Timestamp, later)
        );
        assert_eq!(
            idempotency_key(post, &job, ImageKeyStrategy::PromptHash, earlier),
            idempotency_key(post, &job, ImageKeyStrategy::PromptHash, later)
        );
    }

    #[test]
    fn parses_strategy() {
        assert_eq!("prompt_hash".parse::<ImageKeyStrategy>().unwrap(), ImageKeyStrategy::PromptHash);
        assert!("random".parse::<ImageKeyStrategy>().is_err());
    }

    #[test]
    fn artifact_keys_follow_content() {
        assert_eq!(artifact_key(&ContentJob::Faq, Some("faq:abc")), "faq");
        assert_eq!(
            artifact_key(&ContentJob::section("Getting Started"), None),
            "section:getting started"
        );
        assert_eq!(
            artifact_key(&ContentJob::image("x"), Some("image:post:1700000000000000")),
            "image:1700000000000000"
        );
    }
}

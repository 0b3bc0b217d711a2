use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use research::PostId;

use super::ContentType;

/// Generated content stored against a post.
///
/// Keyed by `(post_id, key)`; writing the same key again replaces the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub post_id: PostId,
    pub key: String,
    pub content_type: ContentType,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        post_id: PostId,
        key: impl Into<String>,
        content_type: ContentType,
        body: impl Into<String>,
    ) -> Self {
        Self {
            post_id,
            key: key.into(),
            content_type,
            body: body.into(),
            updated_at: Utc::now(),
        }
    }
}

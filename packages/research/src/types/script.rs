use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The writable script for a post, produced from optimized research.
///
/// Content jobs (introduction, sections, FAQ, images) are written from the
/// script rather than from raw research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    /// Section headings in reading order.
    pub outline: Vec<String>,
    pub body: String,
    pub language: String,
    pub sources: Vec<String>,
    /// SHA-256 of the prompt that produced the body.
    pub prompt_hash: String,
    pub generated_at: DateTime<Utc>,
}

impl Script {
    /// Body of the outline section with the given heading, if the script
    /// contains one.
    pub fn section_notes(&self, heading: &str) -> Option<&str> {
        let wanted = heading.trim().to_lowercase();
        let mut start = None;
        let mut offset = 0;

        for line in self.body.lines() {
            let line_len = line.len() + 1;
            let trimmed = line.trim_start_matches('#').trim().to_lowercase();
            if line.starts_with('#') {
                if let Some(begin) = start {
                    return Some(self.body[begin..offset].trim());
                }
                if trimmed == wanted {
                    start = Some((offset + line_len).min(self.body.len()));
                }
            }
            offset += line_len;
        }

        start.map(|begin| self.body[begin.min(self.body.len())..].trim())
    }
}

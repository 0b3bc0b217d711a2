/// Turns raw page text into prose fit for summarization.
///
/// Implementations must be pure and idempotent: cleaning already-clean text
/// returns it unchanged.
pub trait TextCleaner: Send + Sync {
    fn clean(&self, raw: &str) -> String;
}

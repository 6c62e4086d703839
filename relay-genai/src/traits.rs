use crate::error::Result;
use async_trait::async_trait;

/// Seam for prompt-to-text generation so callers can be tested without a
/// network backend.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply for `prompt`. Implementations must never return an
    /// empty string; an empty candidate is a format error.
    async fn generate_reply(&self, prompt: &str) -> Result<String>;
}

//! BYO-key generative-reply client for ChatRelay.
//!
//! Pure HTTP client: sends a free-text prompt to the generative backend and
//! extracts the first candidate's text through a strongly-typed response
//! structure. Structural mismatches are typed errors, never panics.

mod error;
mod gemini;
mod traits;

pub use error::{GenAiError, Result};
pub use gemini::GeminiClient;
pub use traits::ReplyGenerator;

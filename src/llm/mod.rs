//! Chat-completion backends used to phrase the final answer.

use anyhow::Result;

pub mod gemini;

pub use gemini::GeminiChat;

/// Trait implemented by concrete LLM providers.
pub trait ChatModel {
    /// Sends a fully rendered prompt and returns the raw model text.
    fn complete(&self, prompt: &str) -> Result<String>;
}

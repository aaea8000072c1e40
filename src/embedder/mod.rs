//! Embedding clients that turn text into fixed-length vectors.

use anyhow::Result;

pub mod gemini;

pub use gemini::GeminiEmbedder;

/// Trait implemented by concrete embedding backends.
pub trait Embedder {
    /// Embeds texts that will be stored, preserving input order.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

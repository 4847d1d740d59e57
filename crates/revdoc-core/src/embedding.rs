//! Embedder trait and vector similarity.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus [`cosine_similarity`] used by the index.
//!
//! Concrete providers (OpenAI, Ollama, hashing, local models) live in the
//! `revdoc` app crate. Providers report authentication, quota, and timeout
//! failures as [`Error::EmbeddingProvider`](crate::Error::EmbeddingProvider).

use async_trait::async_trait;

use crate::error::Result;

/// An embedding backend producing fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the expected vector dimensionality, or `0` if unknown until
    /// the first call.
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in input order.
    ///
    /// The default calls [`embed`](Embedder::embed) once per item;
    /// providers with a batch endpoint override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

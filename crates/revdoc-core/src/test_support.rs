//! Deterministic embedders shared by unit tests.

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::{Error, Result};

/// Counts occurrences of a fixed vocabulary; one dimension per word.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub const VOCAB: [&'static str; 10] = [
        "alpha", "beta", "gamma", "budget", "deadline", "revenue", "holiday", "policy", "remote",
        "office",
    ];

    pub fn vectorize(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        Self::VOCAB
            .iter()
            .map(|v| words.iter().filter(|w| *w == v).count() as f32)
            .collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        Self::VOCAB.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vectorize(text))
    }
}

/// Always fails the way a rejected API key does.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-test"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingProvider("401 Unauthorized: invalid api key".to_string()))
    }
}

//! In-memory vector index and its builder.
//!
//! [`IndexBuilder::build`] turns metadata-carrying [`PendingChunk`]s into a
//! [`VectorIndex`]. Construction is all-or-nothing: metadata is checked for
//! every chunk before the first embedding call, and any embedder failure
//! drops the vectors gathered so far.
//!
//! Search is brute-force cosine similarity over every stored vector, which
//! is adequate for the handful of documents one session ingests.

use std::cmp::Ordering;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::models::{PendingChunk, ScoredChunk, TextChunk, META_SOURCE, META_VERSION};

/// Default number of texts sent to the embedder per call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

impl TryFrom<PendingChunk> for TextChunk {
    type Error = Error;

    /// Accept a chunk only if it names its source and a parseable version.
    fn try_from(pending: PendingChunk) -> Result<Self> {
        let missing = |key: &str| Error::MetadataMissing {
            chunk_index: pending.chunk_index,
            key: key.to_string(),
        };

        let source_identifier = pending
            .metadata
            .get(META_SOURCE)
            .filter(|s| !s.is_empty())
            .cloned()
            .ok_or_else(|| missing(META_SOURCE))?;
        let version = pending
            .metadata
            .get(META_VERSION)
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| missing(META_VERSION))?;

        Ok(TextChunk {
            content: pending.text,
            source_identifier,
            version,
            chunk_index: pending.chunk_index,
        })
    }
}

struct IndexEntry {
    chunk: TextChunk,
    vector: Vec<f32>,
}

/// Read-only similarity index over one session's chunks.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dims: usize,
    model: String,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Top `k` chunks by cosine similarity, highest first.
    ///
    /// The sort is stable, so equal scores keep insertion order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query_vec.len() != self.dims {
            return Err(Error::Retrieval(format!(
                "query vector has {} dimensions, index has {}",
                query_vec.len(),
                self.dims
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("len", &self.entries.len())
            .field("dims", &self.dims)
            .field("model", &self.model)
            .finish()
    }
}

/// Embeds chunks and assembles a [`VectorIndex`].
#[derive(Debug, Clone, Copy)]
pub struct IndexBuilder {
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub async fn build(&self, chunks: Vec<PendingChunk>, embedder: &dyn Embedder) -> Result<VectorIndex> {
        if chunks.is_empty() {
            return Err(Error::Input("no text chunks to index".to_string()));
        }

        let accepted: Vec<TextChunk> = chunks
            .into_iter()
            .map(TextChunk::try_from)
            .collect::<Result<_>>()?;

        let mut dims = embedder.dims();
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(accepted.len());
        let mut pending = accepted.into_iter().peekable();
        let mut batch_no = 0usize;

        while pending.peek().is_some() {
            let batch: Vec<TextChunk> = pending.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(Error::EmbeddingProvider(format!(
                    "embedder returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.into_iter().zip(vectors) {
                if dims == 0 {
                    dims = vector.len();
                }
                if vector.is_empty() || vector.len() != dims {
                    return Err(Error::EmbeddingProvider(format!(
                        "embedding for {} chunk {} has {} dimensions, expected {}",
                        chunk.source_identifier,
                        chunk.chunk_index,
                        vector.len(),
                        dims
                    )));
                }
                entries.push(IndexEntry { chunk, vector });
            }

            batch_no += 1;
            tracing::debug!(batch = batch_no, embedded = entries.len(), "embedded batch");
        }

        tracing::info!(
            chunks = entries.len(),
            dims,
            model = embedder.model_name(),
            "vector index built"
        );

        Ok(VectorIndex {
            entries,
            dims,
            model: embedder.model_name().to_string(),
        })
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::test_support::{FailingEmbedder, KeywordEmbedder};

    fn pending(text: &str, source: &str, version: u64, idx: usize) -> PendingChunk {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source.to_string());
        metadata.insert(META_VERSION.to_string(), version.to_string());
        PendingChunk {
            text: text.to_string(),
            chunk_index: idx,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_build_tags_chunks() {
        let chunks = vec![
            pending("alpha budget", "plan_v1.docx", 1, 0),
            pending("beta budget", "plan_v2.docx", 2, 0),
        ];
        let index = IndexBuilder::new(1).build(chunks, &KeywordEmbedder).await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dims(), KeywordEmbedder::VOCAB.len());
        let tagged: Vec<(&str, u64)> = index
            .chunks()
            .map(|c| (c.source_identifier.as_str(), c.version))
            .collect();
        assert_eq!(tagged, vec![("plan_v1.docx", 1), ("plan_v2.docx", 2)]);
    }

    #[tokio::test]
    async fn test_missing_version_fails_loudly() {
        let mut chunk = pending("alpha", "plan_v1.docx", 1, 3);
        chunk.metadata.remove(META_VERSION);
        let err = IndexBuilder::default()
            .build(vec![chunk], &KeywordEmbedder)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::MetadataMissing {
                chunk_index: 3,
                key: META_VERSION.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_embedding() {
        let mut chunk = pending("alpha", "plan_v1.docx", 1, 0);
        chunk.metadata.remove(META_SOURCE);
        // FailingEmbedder would report a provider error if it were called
        let err = IndexBuilder::default()
            .build(vec![chunk], &FailingEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MetadataMissing { .. }));
    }

    #[tokio::test]
    async fn test_malformed_version_counts_as_missing() {
        let mut chunk = pending("alpha", "plan_v1.docx", 1, 0);
        chunk.metadata.insert(META_VERSION.to_string(), "two".to_string());
        let err = IndexBuilder::default()
            .build(vec![chunk], &KeywordEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MetadataMissing { ref key, .. } if key == META_VERSION));
    }

    #[tokio::test]
    async fn test_embedder_failure_aborts_build() {
        let chunks = vec![pending("alpha", "a.docx", 0, 0)];
        let err = IndexBuilder::default()
            .build(chunks, &FailingEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingProvider(_)));
    }

    #[tokio::test]
    async fn test_empty_chunks_is_input_error() {
        let err = IndexBuilder::default()
            .build(Vec::new(), &KeywordEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[tokio::test]
    async fn test_search_orders_and_truncates() {
        let chunks = vec![
            pending("alpha", "a.docx", 0, 0),
            pending("alpha budget", "b.docx", 0, 0),
            pending("gamma", "c.docx", 0, 0),
        ];
        let index = IndexBuilder::default().build(chunks, &KeywordEmbedder).await.unwrap();
        let query = KeywordEmbedder::vectorize("alpha");
        let hits = index.search(&query, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_identifier(), "a.docx");
        assert_eq!(hits[1].source_identifier(), "b.docx");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_ties_keep_insertion_order() {
        let chunks = vec![
            pending("budget", "first.docx", 0, 0),
            pending("budget", "second.docx", 0, 0),
        ];
        let index = IndexBuilder::default().build(chunks, &KeywordEmbedder).await.unwrap();
        let hits = index.search(&KeywordEmbedder::vectorize("budget"), 5).unwrap();
        assert_eq!(hits[0].source_identifier(), "first.docx");
        assert_eq!(hits[1].source_identifier(), "second.docx");
    }

    #[tokio::test]
    async fn test_search_dimension_mismatch_is_retrieval_error() {
        let index = IndexBuilder::default()
            .build(vec![pending("alpha", "a.docx", 0, 0)], &KeywordEmbedder)
            .await
            .unwrap();
        let err = index.search(&[1.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
        assert!(index.search(&KeywordEmbedder::vectorize("alpha"), 0).unwrap().is_empty());
    }
}

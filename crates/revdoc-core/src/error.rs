//! Error taxonomy for the retrieval pipeline.
//!
//! Each variant maps to one failure class so callers can tell "failed to
//! build" from "failed to search" from "nothing relevant" (the last one is
//! not an error at all, see [`crate::select::Answer`]).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Nothing eligible to index after version filtering or loading.
    #[error("no eligible documents: {0}")]
    Input(String),

    /// A source document could not be read or decoded.
    #[error("failed to load {identifier}: {reason}")]
    DocumentLoad { identifier: String, reason: String },

    /// Authentication, quota, timeout, or malformed response from the embedder.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// A chunk reached the index without its source or version metadata.
    #[error("chunk {chunk_index} is missing required metadata `{key}`")]
    MetadataMissing { chunk_index: usize, key: String },

    /// Query-time failure; the index itself remains usable.
    #[error("retrieval failed: {0}")]
    Retrieval(String),
}

pub type Result<T> = std::result::Result<T, Error>;

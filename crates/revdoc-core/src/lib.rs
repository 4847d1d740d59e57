//! # revdoc core
//!
//! Runtime-free logic for version-aware document retrieval: data models,
//! filename version resolution, overlapping chunking, the embedder trait,
//! the in-memory vector index, and the retrieval selector.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Document
//! loaders and embedding providers are supplied by the application through
//! the [`loader::DocumentLoader`] and [`embedding::Embedder`] traits.
//!
//! ## Pipeline
//!
//! ```text
//! uploads ──▶ version ──▶ loader ──▶ chunk ──▶ index ──▶ select ──▶ Answer
//!            (dedup)     (text)    (+meta)   (embed)   (latest)
//! ```
//!
//! [`session::Session`] owns the result of one ingestion and answers queries
//! against it; re-ingesting builds a new session.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod loader;
pub mod models;
pub mod select;
pub mod session;
pub mod version;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod test_support;

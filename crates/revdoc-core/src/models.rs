//! Core data models for the version-aware retrieval pipeline.
//!
//! Documents flow through these types in order:
//! [`Upload`] → [`SourceDocument`] → [`Segment`] → [`PendingChunk`] →
//! [`TextChunk`] (owned by the index) → [`ScoredChunk`] (query results).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::version;

/// Metadata key carrying the source identifier (filename).
pub const META_SOURCE: &str = "source_file";
/// Metadata key carrying the parsed version, as a decimal string.
pub const META_VERSION: &str = "version";

/// String metadata attached to segments and chunks.
pub type Metadata = BTreeMap<String, String>;

/// A raw item handed to the pipeline by the front end.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Filename, including any version marker (e.g. `report_v2.docx`).
    pub identifier: String,
    /// MIME type used to select the extraction routine.
    pub declared_type: String,
    pub bytes: Vec<u8>,
    /// Set when the front end refused to read the content. The upload still
    /// takes part in version resolution, so it keeps its place as the latest
    /// revision, but loading it fails with this reason.
    pub rejection: Option<String>,
}

impl Upload {
    pub fn new(identifier: impl Into<String>, declared_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            declared_type: declared_type.into(),
            bytes,
            rejection: None,
        }
    }

    /// An upload whose bytes were never read.
    pub fn rejected(identifier: impl Into<String>, declared_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            declared_type: declared_type.into(),
            bytes: Vec::new(),
            rejection: Some(reason.into()),
        }
    }
}

/// One logical revision of a document.
///
/// Built once per upload; the version and base name are derived from the
/// identifier and never change afterwards.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    identifier: String,
    version: u64,
    base_name: String,
    declared_type: String,
    bytes: Vec<u8>,
    rejection: Option<String>,
}

impl SourceDocument {
    pub fn new(identifier: impl Into<String>, declared_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let identifier = identifier.into();
        let parsed = version::parse(&identifier);
        Self {
            version: parsed.version,
            base_name: parsed.base_name,
            identifier,
            declared_type: declared_type.into(),
            bytes,
            rejection: None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    /// The metadata every segment and chunk of this document must carry.
    pub fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(META_SOURCE.to_string(), self.identifier.clone());
        meta.insert(META_VERSION.to_string(), self.version.to_string());
        meta
    }
}

impl From<Upload> for SourceDocument {
    fn from(upload: Upload) -> Self {
        let mut doc = SourceDocument::new(upload.identifier, upload.declared_type, upload.bytes);
        doc.rejection = upload.rejection;
        doc
    }
}

/// A run of extracted text together with its source metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub metadata: Metadata,
}

/// A chunk whose metadata has not been checked yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChunk {
    pub text: String,
    pub chunk_index: usize,
    pub metadata: Metadata,
}

/// A chunk accepted into the index, with verified provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    pub content: String,
    pub source_identifier: String,
    pub version: u64,
    pub chunk_index: usize,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

impl ScoredChunk {
    pub fn version(&self) -> u64 {
        self.chunk.version
    }

    pub fn source_identifier(&self) -> &str {
        &self.chunk.source_identifier
    }
}

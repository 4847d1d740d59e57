//! Ingestion session: the owned state one upload produces.
//!
//! A [`Session`] holds the [`VersionGroup`] and [`VectorIndex`] built from
//! one set of uploads, plus the selector used to answer queries against
//! them. Nothing is shared between sessions: re-ingesting means building a
//! new `Session` and dropping the old one.
//!
//! # Ingestion
//!
//! 1. Wrap uploads as [`SourceDocument`]s (version and base name parsed).
//! 2. Resolve versions under the configured [`VersionPolicy`]; nothing
//!    eligible is an [`Error::Input`] before any embedding spend.
//! 3. Load, stamp `source_file`/`version` metadata, and chunk each document
//!    in scope. Each document's bytes are released as soon as its chunks
//!    exist.
//! 4. Build the index; any embedding failure aborts the whole session.

use serde::{Deserialize, Serialize};

use crate::chunk::{chunk_segments, Chunker};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::{IndexBuilder, VectorIndex, DEFAULT_BATCH_SIZE};
use crate::loader::DocumentLoader;
use crate::models::{PendingChunk, ScoredChunk, SourceDocument, Upload};
use crate::select::{select_latest_ranked, Answer, RetrievalSelector, StalePolicy, DEFAULT_TOP_K};
use crate::version::{resolve_latest_by, VersionGroup, VersionPolicy};

/// Which revisions get embedded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestScope {
    /// Only the latest revision of each base name.
    #[default]
    LatestOnly,
    /// Every eligible revision; superseded ones are filtered at query time.
    AllRevisions,
}

/// What to do when a document cannot be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadErrorPolicy {
    /// Record the failure and continue with the remaining documents.
    #[default]
    Skip,
    /// Stop ingestion with [`Error::DocumentLoad`].
    Abort,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub policy: VersionPolicy,
    pub scope: IngestScope,
    pub on_load_error: LoadErrorPolicy,
    pub batch_size: usize,
    pub top_k: usize,
    pub stale_policy: StalePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: VersionPolicy::default(),
            scope: IngestScope::default(),
            on_load_error: LoadErrorPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            top_k: DEFAULT_TOP_K,
            stale_policy: StalePolicy::default(),
        }
    }
}

/// A document that was in scope but produced no chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDocument {
    pub identifier: String,
    pub reason: String,
}

/// Summary of one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub uploads: usize,
    pub eligible: usize,
    pub indexed_documents: usize,
    pub chunks: usize,
    pub superseded: Vec<String>,
    pub excluded: Vec<String>,
    pub failed: Vec<FailedDocument>,
}

#[derive(Debug)]
pub struct Session {
    group: VersionGroup,
    index: VectorIndex,
    selector: RetrievalSelector,
    report: IngestReport,
}

impl Session {
    pub async fn ingest(
        uploads: Vec<Upload>,
        loader: &dyn DocumentLoader,
        chunker: &dyn Chunker,
        embedder: &dyn Embedder,
        options: &SessionOptions,
    ) -> Result<Session> {
        let mut report = IngestReport {
            uploads: uploads.len(),
            ..Default::default()
        };

        let documents: Vec<SourceDocument> = uploads.into_iter().map(SourceDocument::from).collect();
        let resolution = resolve_latest_by(documents, |d| d.identifier(), &options.policy);

        report.eligible = resolution.eligible_count();
        report.excluded = resolution
            .excluded
            .iter()
            .map(|d| d.identifier().to_string())
            .collect();
        report.superseded = resolution
            .superseded
            .iter()
            .map(|d| d.identifier().to_string())
            .collect();

        if resolution.latest.is_empty() {
            return Err(Error::Input(format!(
                "{} uploads, none matching the {} policy",
                report.uploads,
                options.policy.name()
            )));
        }

        let group = resolution.group(|d| d.identifier());
        let in_scope: Vec<SourceDocument> = match options.scope {
            IngestScope::LatestOnly => resolution.latest.into_values().collect(),
            IngestScope::AllRevisions => resolution
                .latest
                .into_values()
                .chain(resolution.superseded)
                .collect(),
        };
        tracing::info!(
            groups = group.len(),
            in_scope = in_scope.len(),
            excluded = report.excluded.len(),
            superseded = report.superseded.len(),
            "versions resolved"
        );

        let mut chunks: Vec<PendingChunk> = Vec::new();
        for doc in in_scope {
            match load_and_chunk(doc, loader, chunker) {
                Ok(doc_chunks) => {
                    report.indexed_documents += 1;
                    chunks.extend(doc_chunks);
                }
                Err(Error::DocumentLoad { identifier, reason })
                    if options.on_load_error == LoadErrorPolicy::Skip =>
                {
                    tracing::warn!(%identifier, %reason, "skipping document");
                    report.failed.push(FailedDocument { identifier, reason });
                }
                Err(err) => return Err(err),
            }
        }

        if chunks.is_empty() {
            return Err(Error::Input(
                "no text could be extracted from the eligible documents".to_string(),
            ));
        }
        report.chunks = chunks.len();

        let index = IndexBuilder::new(options.batch_size).build(chunks, embedder).await?;

        Ok(Session {
            group,
            index,
            selector: RetrievalSelector::new(options.top_k, options.stale_policy),
            report,
        })
    }

    /// Answer a query from current revisions only.
    pub async fn answer(&self, embedder: &dyn Embedder, query: &str) -> Result<Answer> {
        self.selector.answer(&self.index, &self.group, embedder, query).await
    }

    /// Up to `n` current-revision hits of the highest version in the window.
    pub async fn ranked(&self, embedder: &dyn Embedder, query: &str, n: usize) -> Result<Vec<ScoredChunk>> {
        let window = self
            .selector
            .search_text(&self.index, embedder, query, self.selector.top_k())
            .await?;
        let current = RetrievalSelector::current_only(window, &self.group);
        Ok(select_latest_ranked(&current, n).into_iter().cloned().collect())
    }

    pub fn group(&self) -> &VersionGroup {
        &self.group
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }
}

/// Load one document and chunk it, consuming its bytes.
fn load_and_chunk(doc: SourceDocument, loader: &dyn DocumentLoader, chunker: &dyn Chunker) -> Result<Vec<PendingChunk>> {
    let load_failed = |reason: String| Error::DocumentLoad {
        identifier: doc.identifier().to_string(),
        reason,
    };
    if let Some(reason) = doc.rejection() {
        return Err(load_failed(reason.to_string()));
    }

    let mut segments = loader
        .load(doc.bytes(), doc.declared_type())
        .map_err(|e| load_failed(e.to_string()))?;

    let provenance = doc.metadata();
    for segment in &mut segments {
        segment.metadata.extend(provenance.clone());
    }

    let chunks = chunk_segments(&segments, chunker);
    if chunks.is_empty() {
        return Err(load_failed("no extractable text".to_string()));
    }
    tracing::debug!(
        identifier = doc.identifier(),
        version = doc.version(),
        segments = segments.len(),
        chunks = chunks.len(),
        "document chunked"
    );
    Ok(chunks)
}

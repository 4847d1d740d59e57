//! Version-aware answer selection.
//!
//! Selection only ever looks at the top-k window returned by one similarity
//! search. When that window holds nothing from a current revision, the
//! caller gets [`Answer::NoLatestContent`] instead of an older revision's
//! text, unless it opted into [`StalePolicy::FallbackToNewest`].
//!
//! # Steps
//!
//! 1. Embed the query and take the top-k window from the index.
//! 2. Empty window → [`Answer::NoMatch`].
//! 3. Keep chunks whose source is the latest member of its version group.
//! 4. Nothing left → [`Answer::NoLatestContent`] (or a `stale` answer under
//!    the fallback policy).
//! 5. Otherwise [`select_latest`] over what is left → [`Answer::Found`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::ScoredChunk;
use crate::version::VersionGroup;

/// Default size of the top-k window.
pub const DEFAULT_TOP_K: usize = 5;

/// What to do when the window holds no current-revision chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// Report that no latest content was found.
    #[default]
    Reject,
    /// Answer from the newest version present in the window, marked stale.
    #[serde(rename = "fallback")]
    FallbackToNewest,
}

/// Outcome of one query, ready for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Answer {
    Found {
        text: String,
        source_identifier: String,
        version: u64,
        score: f32,
        /// True only under [`StalePolicy::FallbackToNewest`] when the text
        /// comes from a superseded revision.
        stale: bool,
    },
    /// The window had matches, but none from a current revision.
    NoLatestContent { stale_candidates: usize },
    /// The search returned nothing at all.
    NoMatch,
}

impl Answer {
    fn from_hit(hit: &ScoredChunk, stale: bool) -> Self {
        Answer::Found {
            text: hit.chunk.content.clone(),
            source_identifier: hit.chunk.source_identifier.clone(),
            version: hit.chunk.version,
            score: hit.score,
            stale,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Answer::Found { .. })
    }
}

/// Pick the best hit among the highest version present in `results`.
///
/// Within the max-version subset the highest score wins; equal scores go
/// to the earlier hit, so a rank-ordered window yields its first
/// max-version entry. Returns `None` for an empty slice.
pub fn select_latest(results: &[ScoredChunk]) -> Option<&ScoredChunk> {
    select_latest_ranked(results, 1).into_iter().next()
}

/// Every hit carrying the maximal version, best score first, at most `n`.
pub fn select_latest_ranked(results: &[ScoredChunk], n: usize) -> Vec<&ScoredChunk> {
    let Some(max_version) = results.iter().map(ScoredChunk::version).max() else {
        return Vec::new();
    };
    let mut subset: Vec<&ScoredChunk> = results
        .iter()
        .filter(|r| r.version() == max_version)
        .collect();
    subset.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    subset.truncate(n);
    subset
}

/// Runs queries against an index and applies version filtering.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalSelector {
    top_k: usize,
    stale_policy: StalePolicy,
}

impl RetrievalSelector {
    pub fn new(top_k: usize, stale_policy: StalePolicy) -> Self {
        Self { top_k, stale_policy }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn stale_policy(&self) -> StalePolicy {
        self.stale_policy
    }

    /// Top-`k` window for an already embedded query.
    pub fn search(&self, index: &VectorIndex, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        index.search(query_vec, k)
    }

    /// Embed `query` and return its top-`k` window.
    ///
    /// A query-embedding failure is reported as [`Error::Retrieval`]; the
    /// index is unaffected.
    pub async fn search_text(
        &self,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embedder
            .embed(query)
            .await
            .map_err(|e| Error::Retrieval(format!("query embedding failed: {}", e)))?;
        self.search(index, &query_vec, k)
    }

    /// Current-revision hits from the window, in rank order.
    pub fn current_only(window: Vec<ScoredChunk>, group: &VersionGroup) -> Vec<ScoredChunk> {
        window
            .into_iter()
            .filter(|hit| group.is_current(hit.source_identifier()))
            .collect()
    }

    /// Answer `query` from the current revisions in `group`.
    pub async fn answer(
        &self,
        index: &VectorIndex,
        group: &VersionGroup,
        embedder: &dyn Embedder,
        query: &str,
    ) -> Result<Answer> {
        let window = self.search_text(index, embedder, query, self.top_k).await?;
        if window.is_empty() {
            return Ok(Answer::NoMatch);
        }

        let window_len = window.len();
        let current = Self::current_only(window.clone(), group);
        if let Some(hit) = select_latest(&current) {
            tracing::debug!(
                source = hit.source_identifier(),
                version = hit.version(),
                score = hit.score,
                "selected answer"
            );
            return Ok(Answer::from_hit(hit, false));
        }

        match self.stale_policy {
            StalePolicy::Reject => {
                tracing::warn!(window = window_len, "top-k window holds no current-revision content");
                Ok(Answer::NoLatestContent {
                    stale_candidates: window_len,
                })
            }
            StalePolicy::FallbackToNewest => {
                let hit = select_latest(&window)
                    .ok_or_else(|| Error::Retrieval("empty window after filtering".to_string()))?;
                tracing::warn!(
                    source = hit.source_identifier(),
                    version = hit.version(),
                    "answering from a superseded revision (fallback enabled)"
                );
                Ok(Answer::from_hit(hit, true))
            }
        }
    }
}

impl Default for RetrievalSelector {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K, StalePolicy::default())
    }
}

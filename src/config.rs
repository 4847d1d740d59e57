use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use revdoc_core::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use revdoc_core::index::DEFAULT_BATCH_SIZE;
use revdoc_core::select::{StalePolicy, DEFAULT_TOP_K};
use revdoc_core::session::{IngestScope, LoadErrorPolicy, SessionOptions};
use revdoc_core::version::VersionPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub versioning: VersioningConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VersionMode {
    #[default]
    BestEffort,
    StrictMarker,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VersioningConfig {
    #[serde(default)]
    pub mode: VersionMode,
    /// Required substring in strict-marker mode, e.g. `"v"` or `"rev"`.
    #[serde(default)]
    pub marker: Option<String>,
}

impl VersioningConfig {
    pub fn policy(&self) -> VersionPolicy {
        match (self.mode, &self.marker) {
            (VersionMode::StrictMarker, Some(marker)) => VersionPolicy::StrictMarker(marker.clone()),
            _ => VersionPolicy::BestEffort,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub scope: IngestScope,
    #[serde(default)]
    pub on_load_error: LoadErrorPolicy,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scope: IngestScope::default(),
            on_load_error: LoadErrorPolicy::default(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.docx".to_string()]
}
fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub stale_policy: StalePolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            stale_policy: StalePolicy::default(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: Option<usize>,
    /// Base URL override; providers fall back to their public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> Option<String> {
    Some("text-embedding-3-small".to_string())
}
fn default_dims() -> Option<usize> {
    Some(1536)
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Providers that talk to a server and so need an explicit model shape.
    pub fn is_network(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    /// Per-target overrides, e.g. `revdoc_core = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Options for one ingestion session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            policy: self.versioning.policy(),
            scope: self.ingest.scope,
            on_load_error: self.ingest.on_load_error,
            batch_size: self.embedding.batch_size,
            top_k: self.retrieval.top_k,
            stale_policy: self.retrieval.stale_policy,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if self.versioning.mode == VersionMode::StrictMarker
            && self.versioning.marker.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("versioning.marker must be set when mode is 'strict-marker'");
        }

        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "hash" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hash, or local.",
                other
            ),
        }

        if self.embedding.is_network() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

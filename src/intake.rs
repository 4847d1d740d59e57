//! Turn command-line paths into [`Upload`]s.
//!
//! Files named explicitly are always taken. Directories are walked in
//! file-name order; a file inside one is taken when its path relative to
//! that directory matches `ingest.include_globs` and none of the exclude
//! globs (the defaults below plus `ingest.exclude_globs`).
//!
//! The upload identifier is the bare file name, since that is what carries
//! the version marker. When two paths share a file name only the first is
//! kept.
//!
//! Discovery ([`discover_files`]) only looks at names and sizes. Files over
//! `ingest.max_file_bytes` are not read, but they still become uploads
//! (rejected ones) so they keep their place during version resolution and
//! show up as failed documents instead of vanishing.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use revdoc_core::models::Upload;

use crate::config::IngestConfig;
use crate::extract::mime_for_path;

const DEFAULT_EXCLUDES: [&str; 4] = ["**/.git/**", "**/target/**", "**/node_modules/**", "**/~$*"];

/// A file picked for ingestion, before its content is read.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub identifier: String,
}

pub fn discover_files(paths: &[PathBuf], config: &IngestConfig) -> Result<Vec<DiscoveredFile>> {
    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path)
                .follow_links(config.follow_symlinks)
                .sort_by_file_name();
            for entry in walker {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
                let rel_str = relative.to_string_lossy();
                if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
                    continue;
                }
                files.push(entry.into_path());
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }

    let mut seen = HashSet::new();
    let mut discovered = Vec::with_capacity(files.len());
    for path in files {
        let Some(identifier) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if !seen.insert(identifier.clone()) {
            tracing::warn!(path = %path.display(), %identifier, "duplicate file name, keeping the first");
            continue;
        }
        discovered.push(DiscoveredFile { path, identifier });
    }
    Ok(discovered)
}

pub fn collect_uploads(paths: &[PathBuf], config: &IngestConfig) -> Result<Vec<Upload>> {
    let uploads = discover_files(paths, config)?
        .into_iter()
        .map(|file| read_upload(file, config.max_file_bytes))
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(files = uploads.len(), "collected uploads");
    Ok(uploads)
}

fn read_upload(file: DiscoveredFile, max_bytes: u64) -> Result<Upload> {
    let DiscoveredFile { path, identifier } = file;
    let declared_type = mime_for_path(&path);
    let size = file_size(&path)?;
    if size > max_bytes {
        tracing::warn!(path = %path.display(), size, max_bytes, "file exceeds ingest.max_file_bytes, not reading it");
        return Ok(Upload::rejected(
            identifier,
            declared_type,
            format!("file is {} bytes, over the {} byte limit", size, max_bytes),
        ));
    }

    let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    tracing::debug!(%identifier, bytes = bytes.len(), "read upload");
    Ok(Upload::new(identifier, declared_type, bytes))
}

pub fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?);
    }
    Ok(builder.build()?)
}

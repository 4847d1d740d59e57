//! `revdoc resolve`: show which revision of each document would be used.
//!
//! No text is extracted and nothing is embedded; this only applies the
//! version policy to file names. Files over `ingest.max_file_bytes` stay in
//! their group and are listed separately, since `ask` and `chat` will
//! report them as failed rather than fall back to an older revision.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use revdoc_core::version::{parse, resolve_latest_by};

use crate::config::Config;
use crate::intake::{discover_files, file_size};

#[derive(Debug, Serialize, PartialEq)]
pub struct GroupLine {
    pub base_name: String,
    pub latest: String,
    pub version: u64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ResolveReport {
    pub policy: &'static str,
    pub groups: Vec<GroupLine>,
    pub superseded: Vec<String>,
    pub excluded: Vec<String>,
    pub oversized: Vec<String>,
}

pub fn resolve_paths(paths: &[PathBuf], config: &Config) -> Result<ResolveReport> {
    let policy = config.versioning.policy();
    let files = discover_files(paths, &config.ingest)?;
    let mut oversized = Vec::new();
    for file in &files {
        if file_size(&file.path)? > config.ingest.max_file_bytes {
            oversized.push(file.identifier.clone());
        }
    }
    let identifiers: Vec<String> = files.into_iter().map(|f| f.identifier).collect();

    let resolution = resolve_latest_by(identifiers, |id| id.as_str(), &policy);
    let groups = resolution
        .latest
        .iter()
        .map(|(base_name, latest)| GroupLine {
            base_name: base_name.clone(),
            latest: latest.clone(),
            version: parse(latest).version,
        })
        .collect();

    Ok(ResolveReport {
        policy: policy.name(),
        groups,
        superseded: resolution.superseded,
        excluded: resolution.excluded,
        oversized,
    })
}

pub fn render(report: &ResolveReport) -> String {
    let mut out = format!("policy: {}\n", report.policy);
    if report.groups.is_empty() {
        out.push_str("no eligible documents\n");
    }
    for group in &report.groups {
        out.push_str(&format!(
            "{}  ->  {} (version {})\n",
            group.base_name, group.latest, group.version
        ));
    }
    if !report.superseded.is_empty() {
        out.push_str(&format!("superseded: {}\n", report.superseded.join(", ")));
    }
    if !report.excluded.is_empty() {
        out.push_str(&format!("excluded: {}\n", report.excluded.join(", ")));
    }
    if !report.oversized.is_empty() {
        out.push_str(&format!("too large to ingest: {}\n", report.oversized.join(", ")));
    }
    out
}

pub fn run_resolve(paths: &[PathBuf], config: &Config, json: bool) -> Result<()> {
    let report = resolve_paths(paths, config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

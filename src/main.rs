//! # revdoc CLI
//!
//! Answers questions from the latest revision of each uploaded document.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `revdoc resolve <paths>` | Show the revision chosen for each document; no embedding |
//! | `revdoc ask <paths> --query "..."` | Ingest, answer one question, exit |
//! | `revdoc chat <paths>` | Ingest once, then answer questions read from stdin |
//!
//! ## Examples
//!
//! ```bash
//! revdoc resolve ./reports
//! revdoc ask ./reports --query "When is the budget deadline?"
//! revdoc --config revdoc.toml --strict-marker _v chat report_v1.docx report_v2.docx
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

use revdoc::config::{self, Config, VersionMode};
use revdoc::{ask, embedding, logging, resolve};

/// Version-aware question answering over office documents.
///
/// Files named like `report_v1.docx` and `report_v2.docx` are treated as
/// revisions of one document; only the newest revision is used to answer.
#[derive(Parser)]
#[command(name = "revdoc", version)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only consider files whose name contains this marker (case-insensitive).
    #[arg(long, global = true)]
    strict_marker: Option<String>,

    /// Embed every revision and filter superseded ones at query time.
    #[arg(long, global = true)]
    all_revisions: bool,

    /// Number of nearest chunks considered per query.
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// API key for the embedding provider. Falls back to `OPENAI_API_KEY`,
    /// then to an interactive prompt.
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which revision of each document would be used.
    Resolve {
        /// Files or directories to scan.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ingest the documents and answer a single question.
    Ask {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// The question to answer.
        #[arg(long, short)]
        query: String,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ingest the documents, then answer questions read line by line from stdin.
    ///
    /// `:reload` re-ingests the same paths; `:quit` or EOF exits.
    Chat {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print each answer as one line of JSON.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    fn effective_config(&self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config(path)?,
            None => Config::default(),
        };

        if let Some(marker) = &self.strict_marker {
            cfg.versioning.mode = VersionMode::StrictMarker;
            cfg.versioning.marker = Some(marker.clone());
        }
        if self.all_revisions {
            cfg.ingest.scope = revdoc_core::session::IngestScope::AllRevisions;
        }
        if let Some(top_k) = self.top_k {
            cfg.retrieval.top_k = top_k;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

/// `--api-key`, then `OPENAI_API_KEY`, then a hidden prompt when stdin is a terminal.
fn api_key(flag: Option<String>, provider: &str) -> anyhow::Result<Option<String>> {
    if provider != "openai" {
        return Ok(None);
    }
    if let Some(key) = flag.or_else(|| std::env::var("OPENAI_API_KEY").ok()) {
        return Ok(Some(key));
    }
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }

    let line = rpassword::prompt_password("OpenAI API key (input hidden): ")
        .context("Failed to read API key")?;
    let key = line.trim().to_string();
    Ok((!key.is_empty()).then_some(key))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.effective_config()?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Resolve { paths, json } => {
            resolve::run_resolve(&paths, &cfg, json)?;
        }
        Commands::Ask { paths, query, json } => {
            let key = api_key(cli.api_key, &cfg.embedding.provider)?;
            let embedder = embedding::create_embedder(&cfg.embedding, key)?;
            ask::run_ask(&paths, &cfg, embedder.as_ref(), &query, json).await?;
        }
        Commands::Chat { paths, json } => {
            let key = api_key(cli.api_key, &cfg.embedding.provider)?;
            let embedder = embedding::create_embedder(&cfg.embedding, key)?;
            ask::run_chat(&paths, &cfg, embedder.as_ref(), json).await?;
        }
    }

    Ok(())
}

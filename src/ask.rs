//! `revdoc ask` and `revdoc chat`: ingest once, then answer queries.
//!
//! Both commands build a [`Session`] from the given paths with the
//! [`OfficeLoader`], an [`OverlapChunker`] sized from `[chunking]`, and
//! the configured embedder. Answers go to stdout; the ingest summary and
//! diagnostics go to stderr.

use anyhow::Result;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use revdoc_core::chunk::OverlapChunker;
use revdoc_core::embedding::Embedder;
use revdoc_core::select::Answer;
use revdoc_core::session::{IngestReport, Session};

use crate::config::Config;
use crate::extract::OfficeLoader;
use crate::intake::collect_uploads;

pub async fn build_session(paths: &[PathBuf], config: &Config, embedder: &dyn Embedder) -> Result<Session> {
    let uploads = collect_uploads(paths, &config.ingest)?;
    let chunker = OverlapChunker::new(config.chunking.chunk_size, config.chunking.overlap);
    let session = Session::ingest(uploads, &OfficeLoader, &chunker, embedder, &config.session_options()).await?;
    tracing::info!(
        documents = session.report().indexed_documents,
        chunks = session.report().chunks,
        model = session.index().model_name(),
        "session ready"
    );
    Ok(session)
}

pub fn summarize(report: &IngestReport) -> String {
    let mut out = format!(
        "indexed {} of {} uploaded documents ({} chunks)",
        report.indexed_documents, report.uploads, report.chunks
    );
    if !report.superseded.is_empty() {
        out.push_str(&format!("\n  superseded: {}", report.superseded.join(", ")));
    }
    if !report.excluded.is_empty() {
        out.push_str(&format!("\n  excluded: {}", report.excluded.join(", ")));
    }
    for failed in &report.failed {
        out.push_str(&format!("\n  failed: {} ({})", failed.identifier, failed.reason));
    }
    out
}

pub fn render_answer(answer: &Answer) -> String {
    match answer {
        Answer::Found {
            text,
            source_identifier,
            version,
            score,
            stale,
        } => {
            let mut out = String::new();
            if *stale {
                out.push_str("warning: no current revision matched; answering from a superseded one\n");
            }
            out.push_str(text.trim());
            out.push_str(&format!(
                "\n\n[source: {}, version {}, score {:.3}]",
                source_identifier, version, score
            ));
            out
        }
        Answer::NoLatestContent { stale_candidates } => format!(
            "warning: no content from the latest document versions matched this query \
             ({} match(es) came from superseded revisions)",
            stale_candidates
        ),
        Answer::NoMatch => "No matching content found.".to_string(),
    }
}

fn format_answer(answer: &Answer, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(answer)?)
    } else {
        Ok(render_answer(answer))
    }
}

pub async fn run_ask(paths: &[PathBuf], config: &Config, embedder: &dyn Embedder, query: &str, json: bool) -> Result<()> {
    let session = build_session(paths, config, embedder).await?;
    eprintln!("{}", summarize(session.report()));

    let answer = session.answer(embedder, query).await?;
    println!("{}", format_answer(&answer, json)?);
    Ok(())
}

/// Read queries from stdin until EOF or `:quit`.
pub async fn run_chat(paths: &[PathBuf], config: &Config, embedder: &dyn Embedder, json: bool) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    chat_loop(paths, config, embedder, json, stdin, &mut stdout).await
}

pub async fn chat_loop<R, W>(
    paths: &[PathBuf],
    config: &Config,
    embedder: &dyn Embedder,
    json: bool,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = build_session(paths, config, embedder).await?;
    eprintln!("{}", summarize(session.report()));
    eprintln!("Type a question, :reload to re-ingest, :quit to exit.");

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        match query {
            "" => continue,
            ":quit" | ":q" => break,
            ":reload" => {
                match build_session(paths, config, embedder).await {
                    Ok(fresh) => {
                        session = fresh;
                        eprintln!("{}", summarize(session.report()));
                    }
                    Err(e) => eprintln!("error: reload failed, keeping previous documents: {:#}", e),
                }
                continue;
            }
            _ => {}
        }

        match session.answer(embedder, query).await {
            Ok(answer) => {
                let rendered = format_answer(&answer, json)?;
                output.write_all(rendered.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

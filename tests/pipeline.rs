//! End-to-end ingestion and retrieval over in-memory DOCX fixtures with the
//! offline hash embedder.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use revdoc::ask::{build_session, chat_loop};
use revdoc::config::{Config, VersionMode};
use revdoc::embedding::HashEmbedder;
use revdoc_core::select::Answer;
use revdoc_core::session::IngestScope;

fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn setup_reports() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("report_v1.docx"),
        docx_with_paragraphs(&[
            "Quarterly report.",
            "The budget deadline is March third and Marketing owns the launch.",
        ]),
    )
    .unwrap();
    fs::write(
        docs.join("report_v2.docx"),
        docx_with_paragraphs(&[
            "Quarterly report.",
            "The budget deadline is June thirtieth and Finance owns the launch.",
        ]),
    )
    .unwrap();
    fs::write(
        docs.join("handbook.docx"),
        docx_with_paragraphs(&["Employees may work remotely two days a week."]),
    )
    .unwrap();
    (tmp, docs)
}

fn hash_config() -> Config {
    let mut config = Config::default();
    config.embedding.provider = "hash".to_string();
    config.embedding.dims = Some(256);
    config
}

fn found_source(answer: &Answer) -> &str {
    match answer {
        Answer::Found {
            source_identifier, ..
        } => source_identifier,
        other => panic!("expected an answer, got {:?}", other),
    }
}

fn embedder() -> HashEmbedder {
    HashEmbedder::new(256)
}

#[tokio::test]
async fn test_answer_comes_from_latest_revision() {
    let (_tmp, docs) = setup_reports();
    let session = build_session(&[docs], &hash_config(), &embedder()).await.unwrap();

    assert_eq!(session.report().uploads, 3);
    assert_eq!(session.report().superseded, vec!["report_v1.docx".to_string()]);

    let answer = session
        .answer(&embedder(), "When is the budget deadline for the launch?")
        .await
        .unwrap();
    assert_eq!(found_source(&answer), "report_v2.docx");
    if let Answer::Found { text, version, .. } = &answer {
        assert_eq!(*version, 2);
        assert!(text.contains("June"));
        assert!(!text.contains("March"));
    }
}

#[tokio::test]
async fn test_all_revisions_still_answers_from_latest() {
    let (_tmp, docs) = setup_reports();
    let mut config = hash_config();
    config.ingest.scope = IngestScope::AllRevisions;
    let session = build_session(&[docs], &config, &embedder()).await.unwrap();

    assert!(session
        .index()
        .chunks()
        .any(|c| c.source_identifier == "report_v1.docx"));

    // words only v1 contains, so v1 ranks first
    let answer = session
        .answer(&embedder(), "March Marketing budget deadline")
        .await
        .unwrap();
    assert_eq!(found_source(&answer), "report_v2.docx");
}

#[tokio::test]
async fn test_strict_marker_ignores_unmarked_documents() {
    let (_tmp, docs) = setup_reports();
    let mut config = hash_config();
    config.versioning.mode = VersionMode::StrictMarker;
    config.versioning.marker = Some("_v".to_string());
    let session = build_session(&[docs], &config, &embedder()).await.unwrap();

    assert_eq!(session.report().excluded, vec!["handbook.docx".to_string()]);
    assert!(session.index().chunks().all(|c| c.source_identifier == "report_v2.docx"));
}

#[tokio::test]
async fn test_strict_marker_with_no_matches_is_an_error() {
    let (_tmp, docs) = setup_reports();
    let mut config = hash_config();
    config.versioning.mode = VersionMode::StrictMarker;
    config.versioning.marker = Some("rev".to_string());
    let err = build_session(&[docs], &config, &embedder()).await.unwrap_err();
    assert!(err.to_string().contains("eligible"));
}

#[tokio::test]
async fn test_corrupt_document_is_skipped() {
    let (_tmp, docs) = setup_reports();
    fs::write(docs.join("minutes_v4.docx"), b"definitely not a zip").unwrap();
    let session = build_session(&[docs], &hash_config(), &embedder()).await.unwrap();

    let failed: Vec<&str> = session
        .report()
        .failed
        .iter()
        .map(|f| f.identifier.as_str())
        .collect();
    assert_eq!(failed, vec!["minutes_v4.docx"]);
    assert_eq!(session.report().indexed_documents, 2);
}

#[tokio::test]
async fn test_oversized_latest_revision_is_never_replaced() {
    let tmp = TempDir::new().unwrap();
    let v1 = tmp.path().join("report_v1.txt");
    let v2 = tmp.path().join("report_v2.txt");
    fs::write(&v1, "The budget deadline is March.").unwrap();
    fs::write(&v2, "The budget deadline is June. ".repeat(10)).unwrap();

    let mut config = hash_config();
    config.ingest.max_file_bytes = 100;
    config.ingest.scope = IngestScope::AllRevisions;
    let session = build_session(&[v1, v2], &config, &embedder()).await.unwrap();

    assert_eq!(session.report().superseded, vec!["report_v1.txt".to_string()]);
    let failed: Vec<&str> = session
        .report()
        .failed
        .iter()
        .map(|f| f.identifier.as_str())
        .collect();
    assert_eq!(failed, vec!["report_v2.txt"]);

    let answer = session.answer(&embedder(), "budget deadline").await.unwrap();
    assert!(matches!(answer, Answer::NoLatestContent { .. }), "got {:?}", answer);
}

#[tokio::test]
async fn test_chunks_never_lose_provenance() {
    let (_tmp, docs) = setup_reports();
    let mut config = hash_config();
    config.chunking.chunk_size = 40;
    config.chunking.overlap = 10;
    config.ingest.scope = IngestScope::AllRevisions;
    let session = build_session(&[docs], &config, &embedder()).await.unwrap();

    assert!(session.index().len() > 3);
    for chunk in session.index().chunks() {
        let expected = match chunk.source_identifier.as_str() {
            "report_v1.docx" => 1,
            "report_v2.docx" => 2,
            "handbook.docx" => 0,
            other => panic!("unexpected source {}", other),
        };
        assert_eq!(chunk.version, expected);
    }
}

async fn chat(docs: &Path, input: &str) -> String {
    let mut output: Vec<u8> = Vec::new();
    chat_loop(
        &[docs.to_path_buf()],
        &hash_config(),
        &embedder(),
        false,
        input.as_bytes(),
        &mut output,
    )
    .await
    .unwrap();
    String::from_utf8(output).unwrap()
}

#[tokio::test]
async fn test_chat_answers_until_quit() {
    let (_tmp, docs) = setup_reports();
    let out = chat(&docs, "budget deadline\n\n:quit\nremote work\n").await;
    assert_eq!(out.matches("[source:").count(), 1);
    assert!(out.contains("report_v2.docx"));
}

#[tokio::test]
async fn test_chat_reload_rebuilds_session() {
    let (_tmp, docs) = setup_reports();
    let out = chat(&docs, ":reload\nbudget deadline\n").await;
    assert_eq!(out.matches("[source:").count(), 1);
    assert!(out.contains("report_v2.docx"));
}

//! Text extraction for uploaded office documents.
//!
//! [`OfficeLoader`] implements the core [`DocumentLoader`] seam for DOCX,
//! PPTX, XLSX, PDF, and UTF-8 text. OOXML parts are streamed with
//! `quick-xml`; every ZIP entry read is capped to guard against archive
//! bombs.
//!
//! Segment layout:
//! - DOCX: one segment, paragraphs separated by blank lines so the chunker
//!   can prefer paragraph boundaries.
//! - PPTX: one segment per slide (`slide` metadata, 1-based).
//! - XLSX: one segment per sheet (`sheet` metadata, 1-based), one line per row.
//! - PDF and text: one segment.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use revdoc_core::loader::{DocumentLoader, LoadError};
use revdoc_core::models::{Metadata, Segment};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_UNKNOWN: &str = "application/octet-stream";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Ooxml(String),
    Encoding(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => write!(f, "unsupported content type: {}", ct),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Encoding(e) => write!(f, "text is not valid UTF-8: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<ExtractError> for LoadError {
    fn from(err: ExtractError) -> Self {
        LoadError(err.to_string())
    }
}

/// MIME type for a path, from its extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("docx") => MIME_DOCX,
        Some("pptx") => MIME_PPTX,
        Some("xlsx") => MIME_XLSX,
        Some("pdf") => MIME_PDF,
        Some("md" | "markdown") => MIME_MARKDOWN,
        Some("txt" | "text") => MIME_TEXT,
        _ => MIME_UNKNOWN,
    }
}

/// Loader for the office formats handled in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfficeLoader;

impl DocumentLoader for OfficeLoader {
    fn load(&self, bytes: &[u8], declared_type: &str) -> Result<Vec<Segment>, LoadError> {
        let segments = match declared_type {
            MIME_DOCX => vec![segment(extract_docx(bytes)?, None)],
            MIME_PPTX => numbered_segments("slide", extract_pptx(bytes)?),
            MIME_XLSX => numbered_segments("sheet", extract_xlsx(bytes)?),
            MIME_PDF => vec![segment(extract_pdf(bytes)?, None)],
            MIME_TEXT | MIME_MARKDOWN => {
                let text = std::str::from_utf8(bytes).map_err(|e| ExtractError::Encoding(e.to_string()))?;
                vec![segment(text.to_string(), None)]
            }
            other => return Err(ExtractError::UnsupportedContentType(other.to_string()).into()),
        };
        tracing::debug!(declared_type, segments = segments.len(), "extracted text");
        Ok(segments)
    }
}

fn segment(text: String, tag: Option<(&str, usize)>) -> Segment {
    let mut metadata = Metadata::new();
    if let Some((key, n)) = tag {
        metadata.insert(key.to_string(), n.to_string());
    }
    Segment { text, metadata }
}

fn numbered_segments(key: &str, texts: Vec<String>) -> Vec<Segment> {
    texts
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| segment(text, Some((key, i + 1))))
        .collect()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries matching `<prefix><n>.xml`, ordered by `n`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    Ok(paragraphs(&xml)?.join("\n\n"))
}

fn extract_pptx(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        slides.push(paragraphs(&xml)?.join("\n"));
    }
    Ok(slides)
}

/// Text of every non-empty `<*:p>` element, in document order.
///
/// Runs inside `<*:t>` are concatenated without trimming so inter-run
/// spaces survive; `tab` and `br` become whitespace.
fn paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        out.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    // text outside any paragraph, e.g. a bare <a:t> in a shape
    let tail = current.trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        shared_strings(&read_entry(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };
    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        sheets.push(sheet_rows(&xml, &shared)?);
    }
    Ok(sheets)
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

/// Sheet text, one line per row with cells separated by tabs.
fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut kind = CellKind::Value;
    let mut in_value = false;
    let mut cells = 0usize;

    loop {
        if cells >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                }
                b"v" => in_value = true,
                b"t" if kind == CellKind::Inline => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                let raw = raw.trim();
                let text = match kind {
                    CellKind::Shared => raw.parse::<usize>().ok().and_then(|i| shared.get(i)).cloned(),
                    CellKind::Inline | CellKind::Value => Some(raw.to_string()),
                };
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    row.push(text);
                    cells += 1;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join("\t"));
                    }
                    row.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }
    Ok(rows.join("\n"))
}

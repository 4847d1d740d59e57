//! Document loader seam.
//!
//! A loader turns raw bytes plus a declared MIME type into text segments.
//! The pipeline stamps source metadata onto every returned segment, so
//! loaders only need to report what they extracted.

use crate::models::Segment;

/// Failure reported by a [`DocumentLoader`].
///
/// The pipeline wraps it into [`Error::DocumentLoad`](crate::Error::DocumentLoad)
/// together with the document identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError(pub String);

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for LoadError {}

/// Extracts text from one document's bytes.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, bytes: &[u8], declared_type: &str) -> Result<Vec<Segment>, LoadError>;
}

/// Loader for UTF-8 text; rejects invalid UTF-8.
///
/// The core crate's own session tests ingest through it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn load(&self, bytes: &[u8], _declared_type: &str) -> Result<Vec<Segment>, LoadError> {
        let text = std::str::from_utf8(bytes).map_err(|e| LoadError(format!("invalid UTF-8: {}", e)))?;
        Ok(vec![Segment {
            text: text.to_string(),
            metadata: Default::default(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_loader() {
        let segments = PlainTextLoader.load(b"hello", "text/plain").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello");
        assert!(segments[0].metadata.is_empty());
    }

    #[test]
    fn test_plain_text_rejects_binary() {
        let err = PlainTextLoader.load(&[0xff, 0xfe, 0x00], "text/plain").unwrap_err();
        assert!(err.0.contains("UTF-8"));
    }
}

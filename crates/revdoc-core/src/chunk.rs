//! Overlapping, boundary-aware text chunker.
//!
//! Splits extracted document text into pieces of at most `chunk_size`
//! characters, where each piece after the first begins up to `overlap`
//! characters before the previous piece ended.
//!
//! # Algorithm
//!
//! 1. Take a window of `chunk_size` characters from the current start.
//! 2. If the window does not reach the end of the text, pull its end back
//!    to the last paragraph break (`\n\n`), else line break, else space,
//!    found in the second half of the window.
//! 3. Emit the trimmed window (empty windows are skipped).
//! 4. Start the next window `overlap` characters before the end, moved
//!    forward to the next word start so pieces do not begin mid-word.
//!
//! Positions are counted in `char`s, so multi-byte text never splits inside
//! a code point.
//!
//! # Example
//!
//! ```rust
//! use revdoc_core::chunk::{Chunker, OverlapChunker};
//!
//! let chunker = OverlapChunker::new(1000, 100);
//! let pieces = chunker.split("Hello world.\n\nSecond paragraph.");
//! assert_eq!(pieces.len(), 1);
//! ```

use crate::models::{PendingChunk, Segment};

/// Splits text into ordered, possibly overlapping pieces.
///
/// Implementations must be deterministic for identical input.
pub trait Chunker: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_OVERLAP: usize = 100;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapChunker {
    chunk_size: usize,
    overlap: usize,
}

impl OverlapChunker {
    /// `chunk_size` is raised to 1 and `overlap` capped below `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Pull `hard_end` back to a separator boundary, if one exists late
    /// enough in the window to keep progress past the overlap.
    fn soft_end(&self, text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
        let lower = start + (self.overlap + 1).max(self.chunk_size / 2);
        if lower >= hard_end {
            return hard_end;
        }
        let window = &text[bounds[lower]..bounds[hard_end]];
        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let byte = bounds[lower] + pos + sep.len();
                if let Ok(end) = bounds.binary_search(&byte) {
                    return end;
                }
            }
        }
        hard_end
    }

    /// Move `from` forward to the start of the next word before `end`.
    fn next_word_start(text: &str, bounds: &[usize], from: usize, end: usize) -> usize {
        let region = &text[bounds[from]..bounds[end]];
        region
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .and_then(|(off, _)| bounds.binary_search(&(bounds[from] + off)).ok())
            .map(|ws| ws + 1)
            .filter(|&candidate| candidate < end)
            .unwrap_or(from)
    }
}

impl Default for OverlapChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
    }
}

impl Chunker for OverlapChunker {
    fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        // bounds[i] is the byte offset of char i; bounds[n] == text.len()
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n = bounds.len() - 1;

        let mut pieces = Vec::new();
        let mut start = 0usize;
        loop {
            let hard_end = (start + self.chunk_size).min(n);
            let end = if hard_end == n {
                n
            } else {
                self.soft_end(text, &bounds, start, hard_end)
            };

            let piece = text[bounds[start]..bounds[end]].trim();
            if !piece.is_empty() {
                pieces.push(piece.to_string());
            }
            if end >= n {
                break;
            }

            let back = end.saturating_sub(self.overlap);
            start = if back > start {
                Self::next_word_start(text, &bounds, back, end)
            } else {
                end
            };
        }
        pieces
    }
}

/// Chunk every segment of one document, copying each segment's metadata
/// onto all of its chunks.
///
/// Chunk indices are contiguous across segments, starting at 0.
pub fn chunk_segments(segments: &[Segment], chunker: &dyn Chunker) -> Vec<PendingChunk> {
    let mut chunks = Vec::new();
    for segment in segments {
        for text in chunker.split(&segment.text) {
            chunks.push(PendingChunk {
                text,
                chunk_index: chunks.len(),
                metadata: segment.metadata.clone(),
            });
        }
    }
    chunks
}

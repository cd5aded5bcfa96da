//! Sentence-aware text chunking.
//!
//! Text is split into sentence-like units on `.`, `?` or `!` followed by
//! whitespace. Units are packed greedily into chunks of at most `max_chars`
//! characters; each new chunk is seeded with the last `overlap_chars`
//! characters of the previous one, cut shorter when the seed and the next
//! unit would not fit together. A single unit longer than `max_chars` is
//! never split, so such chunks may exceed the limit.

use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};

/// A chunk of corpus text with its global position.
///
/// The ordinal is fixed at chunking time and is the only key used to put
/// embeddings back in order after bulk processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    ordinal: usize,
    text: String,
}

impl Chunk {
    pub fn new(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    /// Create a chunker; `overlap_chars` must be smaller than a non-zero `max_chars`.
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        if max_chars == 0 || overlap_chars >= max_chars {
            return Err(RagError::Config(format!(
                "invalid chunking parameters: max_chars={}, overlap_chars={}",
                max_chars, overlap_chars
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.max_chars, config.overlap_chars)
    }

    /// Split text into chunks. Empty or whitespace-only input yields nothing.
    pub fn split(&self, text: &str) -> Vec<String> {
        chunk(text, self.max_chars, self.overlap_chars)
    }

    /// Split one named document, rejecting documents with no content.
    pub fn chunk_document(&self, name: &str, text: &str) -> Result<Vec<String>> {
        if text.contains('\0') {
            return Err(RagError::Chunking {
                document: name.to_string(),
                reason: "text contains NUL bytes".to_string(),
            });
        }
        let chunks = self.split(text);
        if chunks.is_empty() {
            return Err(RagError::Chunking {
                document: name.to_string(),
                reason: "no text to chunk".to_string(),
            });
        }
        Ok(chunks)
    }
}

/// Split `text` into overlapping chunks along sentence boundaries.
///
/// Lengths are measured in characters, not bytes.
pub fn chunk(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let overlap_chars = overlap_chars.min(max_chars.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0;
    // The overlap seed alone never forms a chunk.
    let mut has_unit = false;

    for unit in sentences(text) {
        let unit_chars = unit.chars().count();
        let separator = usize::from(!buffer.is_empty());

        if has_unit && buffer_chars + separator + unit_chars > max_chars {
            // Seed, separating space and unit must fit in one chunk.
            let seed_chars = overlap_chars.min(max_chars.saturating_sub(unit_chars + 1));
            let seed = tail_chars(&buffer, seed_chars).trim_start().to_string();
            chunks.push(std::mem::replace(&mut buffer, seed));
            buffer_chars = buffer.chars().count();
            has_unit = false;
        }

        if !buffer.is_empty() {
            buffer.push(' ');
            buffer_chars += 1;
        }
        buffer.push_str(unit);
        buffer_chars += unit_chars;
        has_unit = true;
    }

    if has_unit {
        chunks.push(buffer);
    }

    chunks
}

/// Sentence-like units, trimmed, in document order.
fn sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '?' | '!') {
            continue;
        }
        if let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                let end = i + c.len_utf8();
                push_unit(&mut units, &text[start..end]);
                start = end;
            }
        }
    }
    push_unit(&mut units, &text[start..]);

    units
}

fn push_unit<'a>(units: &mut Vec<&'a str>, unit: &'a str) {
    let unit = unit.trim();
    if !unit.is_empty() {
        units.push(unit);
    }
}

/// Last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

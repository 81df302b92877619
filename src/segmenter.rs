/*!
 * Length-based document segmentation.
 *
 * Splits a document into ordered chunks of at most `max_len` characters.
 * The partition has no sentence or paragraph awareness: a split may fall in
 * the middle of a sentence or a word. Lengths and offsets are counted in
 * Unicode scalar values, so a split never lands inside a code point.
 */

use crate::errors::ConfigError;

/// Default maximum chunk length in characters
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// A contiguous, order-indexed slice of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position in the document; defines reassembly order
    pub index: usize,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
    /// The raw text of the slice
    pub text: String,
}

impl Chunk {
    /// Length of the chunk in characters
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the chunk holds no text
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Number of chunks a document of `len` characters splits into
pub fn chunk_count(len: usize, max_len: usize) -> usize {
    if max_len == 0 {
        return 0;
    }
    len.div_ceil(max_len)
}

/// Split `text` into chunks of at most `max_len` characters
pub fn segment(text: &str, max_len: usize) -> Result<Vec<Chunk>, ConfigError> {
    if max_len == 0 {
        return Err(ConfigError::InvalidChunkSize(max_len));
    }

    let mut chunks = Vec::new();
    let mut char_offset = 0;
    let mut rest = text;

    while !rest.is_empty() {
        // Byte position of the `max_len`-th character, or the end of the text
        let split_at = rest
            .char_indices()
            .nth(max_len)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(rest.len());

        let (head, tail) = rest.split_at(split_at);
        let head_len = head.chars().count();

        chunks.push(Chunk {
            index: chunks.len(),
            start: char_offset,
            end: char_offset + head_len,
            text: head.to_string(),
        });

        char_offset += head_len;
        rest = tail;
    }

    Ok(chunks)
}

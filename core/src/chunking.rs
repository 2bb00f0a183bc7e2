//! Sentence-bounded and word-window chunking of document descriptions.

use crate::config;
use crate::{DocId, Document, Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]\s+").expect("valid regex");
}

/// Where a chunk came from. Stored in parallel with the chunk vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: DocId,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chunk_size: config::MAX_SEMANTIC_CHUNK_SIZE, overlap: config::SEMANTIC_CHUNK_OVERLAP }
    }
}

/// Split on `.`, `!` or `?` followed by whitespace. The terminator stays
/// with its sentence and each sentence is trimmed, except that text with no
/// boundary at all is returned as written.
pub fn split_sentences(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if !SENTENCE_END.is_match(text) {
        return vec![text];
    }
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        // terminators are single-byte ASCII
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    sentences.push(&text[start..]);
    sentences.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Group whole sentences into chunks of at most `max_chunk_size`, with
/// `overlap` sentences repeated at the start of each following chunk.
pub fn semantic_chunking(text: &str, max_chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate_window(max_chunk_size, overlap)?;
    Ok(windows(&split_sentences(text), max_chunk_size, overlap))
}

/// Word windows of `chunk_size` words sharing `overlap` words.
pub fn fixed_size_chunking(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate_window(chunk_size, overlap)?;
    let words: Vec<&str> = text.split_whitespace().collect();
    Ok(windows(&words, chunk_size, overlap))
}

/// Chunk one document's description. Empty descriptions give no chunks.
pub fn chunk_document(doc: &Document, cfg: ChunkingConfig) -> Result<Vec<Chunk>> {
    let texts = semantic_chunking(&doc.description, cfg.max_chunk_size, cfg.overlap)?;
    let total_chunks = texts.len();
    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text,
            metadata: ChunkMetadata { document_id: doc.id, chunk_index, total_chunks },
        })
        .collect())
}

fn validate_window(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::invalid("chunk size must be positive"));
    }
    if overlap >= size {
        return Err(Error::invalid(format!("overlap {overlap} must be smaller than chunk size {size}")));
    }
    Ok(())
}

fn windows(items: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    if items.is_empty() {
        return chunks;
    }
    let stride = size - overlap;
    let mut start = 0;
    loop {
        let end = (start + size).min(items.len());
        chunks.push(items[start..end].join(" "));
        if end == items.len() {
            break;
        }
        start += stride;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "One fish. Two fish!  Red fish? Blue fish. The end.";

    #[test]
    fn splits_on_terminators_followed_by_whitespace() {
        assert_eq!(
            split_sentences("Dr.Who waits. Then?! Yes...  no"),
            vec!["Dr.Who waits.", "Then?!", "Yes...", "no"]
        );
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(semantic_chunking("", 4, 1).unwrap().is_empty());
        assert!(semantic_chunking("   \n ", 4, 1).unwrap().is_empty());
    }

    #[test]
    fn single_unterminated_sentence_is_kept() {
        assert_eq!(semantic_chunking("a story without an end", 4, 1).unwrap(), vec!["a story without an end"]);
        assert_eq!(semantic_chunking("Just one.", 2, 1).unwrap(), vec!["Just one."]);
    }

    #[test]
    fn lone_sentence_keeps_surrounding_whitespace() {
        let text = "  a story without an end  ";
        assert_eq!(split_sentences(text), vec![text]);
        assert_eq!(semantic_chunking(text, 4, 1).unwrap(), vec![text.to_string()]);
        // a boundary switches to trimmed sentences
        assert_eq!(split_sentences(" First. second "), vec!["First.", "second"]);
    }

    #[test]
    fn overlapping_chunks() {
        let chunks = semantic_chunking(TEXT, 2, 1).unwrap();
        assert_eq!(
            chunks,
            vec!["One fish. Two fish!", "Two fish! Red fish?", "Red fish? Blue fish.", "Blue fish. The end."]
        );
        let chunks = semantic_chunking(TEXT, 4, 1).unwrap();
        assert_eq!(chunks, vec!["One fish. Two fish! Red fish? Blue fish.", "Blue fish. The end."]);
    }

    #[test]
    fn chunks_rebuild_sentence_sequence() {
        let sentences = split_sentences(TEXT);
        for (size, overlap) in [(1, 0), (2, 0), (2, 1), (3, 1), (3, 2), (4, 1), (10, 3)] {
            let chunks = semantic_chunking(TEXT, size, overlap).unwrap();
            let mut rebuilt: Vec<&str> = Vec::new();
            for (i, chunk) in chunks.iter().enumerate() {
                let parts = split_sentences(chunk);
                // every chunk holds whole sentences
                assert!(parts.iter().all(|p| sentences.contains(p)));
                let skip = if i == 0 { 0 } else { overlap };
                rebuilt.extend(parts.into_iter().skip(skip));
            }
            assert_eq!(rebuilt, sentences, "size {size} overlap {overlap}");
        }
    }

    #[test]
    fn rejects_bad_windows() {
        assert!(matches!(semantic_chunking(TEXT, 0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(semantic_chunking(TEXT, 2, 2), Err(Error::InvalidArgument(_))));
        assert!(matches!(fixed_size_chunking(TEXT, 3, 5), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn fixed_size_word_windows() {
        let chunks = fixed_size_chunking("a b c d e", 2, 0).unwrap();
        assert_eq!(chunks, vec!["a b", "c d", "e"]);
        let chunks = fixed_size_chunking("a b c d e", 3, 1).unwrap();
        assert_eq!(chunks, vec!["a b c", "c d e"]);
    }

    #[test]
    fn chunk_metadata_counts() {
        let doc = Document::new(9, "T", TEXT);
        let chunks = chunk_document(&doc, ChunkingConfig { max_chunk_size: 2, overlap: 1 }).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.metadata.document_id == 9 && c.metadata.total_chunks == 4));
        assert_eq!(chunks[3].metadata.chunk_index, 3);
        assert!(chunk_document(&Document::new(1, "T", ""), ChunkingConfig::default()).unwrap().is_empty());
    }
}

//! Sentence-aligned chunking with sentence-count overlap.
//!
//! Text is split at period-plus-space boundaries (the period stays with its
//! sentence). Sentences accumulate into a chunk until the next one would push
//! it past `chunk_size` characters; the closed chunk's trailing
//! `overlap_sentences` sentences then seed the next chunk. Sentences are never
//! cut, so a lone sentence longer than the budget becomes an oversized chunk.

use crate::types::Chunk;

/// Split `text` into sentences. Newlines count as spaces.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized: String = text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }).collect();
    normalized
        .split_inclusive(". ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Chunk `text` into pieces of roughly `chunk_size` characters.
pub fn chunk(text: &str, chunk_size: usize, overlap_sentences: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0usize;
    let mut carried = 0usize;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if !current.is_empty() && current_chars + 1 + len > chunk_size {
            let seed_len = overlap_sentences.min(current.len());
            let seed = current[current.len() - seed_len..].to_vec();
            chunks.push(build_chunk(std::mem::take(&mut current), carried));
            current_chars = joined_len(&seed);
            carried = seed.len();
            current = seed;
        }
        current_chars = if current.is_empty() { len } else { current_chars + 1 + len };
        current.push(sentence);
    }
    if !current.is_empty() {
        chunks.push(build_chunk(current, carried));
    }
    chunks
}

fn joined_len(sentences: &[String]) -> usize {
    let chars: usize = sentences.iter().map(|s| s.chars().count()).sum();
    chars + sentences.len().saturating_sub(1)
}

fn build_chunk(sentences: Vec<String>, overlap: usize) -> Chunk {
    let text = sentences.join(" ");
    Chunk {
        char_count: text.chars().count(),
        sentence_count: sentences.len(),
        start_sentence: sentences.first().cloned().unwrap_or_default(),
        end_sentence: sentences.last().cloned().unwrap_or_default(),
        text,
        sentences,
        overlap,
    }
}

//! Context assembly and the extractive fallback used when no LLM answers.

use scrible_core::config::AnswerSettings;
use scrible_core::types::{AnswerSource, ResultItem};

pub const NO_INFORMATION: &str = "I don't have enough information in the knowledge base to answer this question.";

pub const SYSTEM_PROMPT: &str = "You are a helpful research assistant. Answer the user's question based on the provided context. Be accurate and cite your sources. If the context doesn't contain enough information, say so clearly.";

const TRUNCATION_MARKER: &str = "... [truncated]";
const BLOCK_SEPARATOR: &str = "\n\n";

pub fn user_prompt(context: &str, question: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {question}\n\nPlease provide a comprehensive answer based on the context above.")
}

fn source_block(item: &ResultItem) -> String {
    format!("Source: {} ({})\n{}", item.document_name, item.document_type, item.content)
}

/// First `max_chars` chars of `text`.
pub fn take_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Source-attributed blocks joined by blank lines, at most `max_chars` chars.
///
/// Blocks are added in rank order. The first block that does not fit whole is
/// cut and marked `... [truncated]`; everything after it is dropped.
pub fn build_context(results: &[ResultItem], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;
    for item in results {
        let block = source_block(item);
        let sep = if context.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
        let block_chars = block.chars().count();
        if used + sep + block_chars <= max_chars {
            if sep > 0 { context.push_str(BLOCK_SEPARATOR); }
            context.push_str(&block);
            used += sep + block_chars;
            continue;
        }
        let room = max_chars.saturating_sub(used + sep + TRUNCATION_MARKER.len());
        if room > 0 {
            if sep > 0 { context.push_str(BLOCK_SEPARATOR); }
            context.push_str(take_chars(&block, room));
            context.push_str(TRUNCATION_MARKER);
        }
        break;
    }
    context
}

/// `excerpt_chars` chars of `content`, with `...` when anything was cut.
pub fn excerpt(content: &str, excerpt_chars: usize) -> String {
    let head = take_chars(content, excerpt_chars);
    if head.len() < content.len() { format!("{head}...") } else { head.to_string() }
}

/// Answer assembled from the top results when no LLM is available.
pub fn fallback_answer(question: &str, results: &[ResultItem], settings: &AnswerSettings) -> String {
    let mut answer = format!("Based on the available sources, here are the most relevant excerpts related to '{question}':\n\n");
    for (i, item) in results.iter().take(settings.fallback_results).enumerate() {
        answer.push_str(&format!(
            "{}. From {}: {}...\n\n",
            i + 1,
            item.document_name,
            take_chars(&item.content, settings.excerpt_chars)
        ));
    }
    answer.trim_end().to_string()
}

pub fn sources(results: &[ResultItem], excerpt_chars: usize) -> Vec<AnswerSource> {
    results
        .iter()
        .map(|r| AnswerSource {
            document: r.document_name.clone(),
            document_type: r.document_type.clone(),
            similarity: r.similarity_score,
            excerpt: excerpt(&r.content, excerpt_chars),
        })
        .collect()
}

/// Top similarity clamped to [0, 1]; zero without results.
pub fn confidence(results: &[ResultItem]) -> f32 {
    results.first().map_or(0.0, |r| r.similarity_score.clamp(0.0, 1.0))
}

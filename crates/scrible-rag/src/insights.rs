//! Per-document summary and key points, with model-free fallbacks.

use crate::answer::take_chars;

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert research assistant. Provide a comprehensive but concise summary of the given content, highlighting key themes, main arguments, and important findings.";
pub const KEY_POINTS_SYSTEM_PROMPT: &str = "Extract 4-6 key points from the given content. Each point should be a concise, important insight or finding. Return as a numbered list.";
pub const SUMMARY_MAX_TOKENS: u32 = 300;
pub const KEY_POINTS_MAX_TOKENS: u32 = 200;
pub const MAX_KEY_POINTS: usize = 6;

const IMPORTANT_TERMS: &[&str] = &[
    "artificial intelligence", "machine learning", "deep learning",
    "neural network", "algorithm", "data", "model", "training",
    "analysis", "research", "study", "method", "approach",
    "system", "technology", "innovation", "development",
    "conclusion", "result", "finding", "discovery",
];
const EMPHASIS_WORDS: &[&str] = &["important", "key", "significant", "crucial", "main"];
const GENERIC_KEY_POINTS: &[&str] = &[
    "Document contains valuable information",
    "Content covers relevant topics",
    "Material provides insights for analysis",
    "Source contributes to research knowledge",
];

pub fn summary_user_prompt(title: &str, kind: &str, content: &str, max_chars: usize) -> String {
    let mut body = take_chars(content, max_chars).to_string();
    if body.len() < content.len() {
        body.push_str("... [content truncated]");
    }
    format!("Please summarize this content:\n\nTitle: {title}\nType: {kind}\n\nContent:\n{body}")
}

pub fn key_points_user_prompt(content: &str, max_chars: usize) -> String {
    format!("Extract key points from:\n\n{}", take_chars(content, max_chars))
}

/// Length-bucketed description used when no summary can be generated.
pub fn fallback_summary(content: &str, kind: &str, title: &str) -> String {
    let words = content.split_whitespace().count();
    if words < 100 {
        format!("Brief {kind} titled '{title}' with {words} words covering the main topic.")
    } else if words < 1000 {
        format!("Medium-length {kind} titled '{title}' ({words} words) discussing key concepts and ideas in detail.")
    } else {
        format!("Comprehensive {kind} titled '{title}' ({words} words) with extensive analysis covering multiple topics and detailed insights.")
    }
}

/// Items of a numbered or bulleted list, markers stripped.
pub fn parse_key_points(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let first = line.chars().next()?;
            let rest = if first.is_ascii_digit() {
                line.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start_matches(['.', ')', ':'])
            } else if first == '-' || first == '•' || first == '*' {
                &line[first.len_utf8()..]
            } else {
                return None;
            };
            let point = rest.trim();
            (!point.is_empty()).then(|| point.to_string())
        })
        .take(MAX_KEY_POINTS)
        .collect()
}

/// Sentences scored by domain terms and emphasis words; a fixed list when nothing scores.
pub fn fallback_key_points(content: &str) -> Vec<String> {
    let mut scored: Vec<(String, usize)> = content
        .split(". ")
        .filter_map(|sentence| {
            let lower = sentence.to_lowercase();
            let mut score: usize = IMPORTANT_TERMS
                .iter()
                .filter(|t| lower.contains(*t))
                .map(|t| t.split_whitespace().count())
                .sum();
            if EMPHASIS_WORDS.iter().any(|w| lower.contains(w)) {
                score += 2;
            }
            (score > 0 && sentence.split_whitespace().count() > 5).then(|| (sentence.trim().to_string(), score))
        })
        .collect();
    // Stable sort keeps document order among equal scores.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let points: Vec<String> = scored.into_iter().take(MAX_KEY_POINTS).map(|(s, _)| s).collect();
    if points.is_empty() {
        return GENERIC_KEY_POINTS.iter().map(|s| s.to_string()).collect();
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_buckets_by_word_count() {
        assert_eq!(fallback_summary("a few words", "pdf", "T"), "Brief pdf titled 'T' with 3 words covering the main topic.");
        let medium = "word ".repeat(150);
        assert!(fallback_summary(&medium, "web", "M").starts_with("Medium-length web titled 'M' (150 words)"));
        let long = "word ".repeat(1000);
        assert!(fallback_summary(&long, "video", "L").starts_with("Comprehensive video titled 'L' (1000 words)"));
    }

    #[test]
    fn numbered_and_bulleted_lists_parse() {
        let text = "Here are the points:\n1. First point\n2) Second point\n- Third point\n• Fourth\n\n10. Tenth";
        assert_eq!(parse_key_points(text), vec!["First point", "Second point", "Third point", "Fourth", "Tenth"]);
    }

    #[test]
    fn key_point_list_is_capped() {
        let text = (1..=9).map(|i| format!("{i}. point {i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_key_points(&text).len(), MAX_KEY_POINTS);
    }

    #[test]
    fn fallback_key_points_prefer_domain_sentences() {
        let content = "The weather was nice today in the park. \
Deep learning models need a lot of training data to generalize well. \
This study presents an important new method for analysis of results. \
Short one.";
        let points = fallback_key_points(content);
        assert_eq!(points.len(), 2);
        assert!(points[0].starts_with("This study"));
        assert!(points[1].starts_with("Deep learning"));
    }

    #[test]
    fn fallback_key_points_default_to_generic_list() {
        assert_eq!(fallback_key_points("Nothing to see here at all today folks."), GENERIC_KEY_POINTS.to_vec());
    }

    #[test]
    fn summary_prompt_marks_truncation() {
        let p = summary_user_prompt("T", "pdf", &"a".repeat(50), 10);
        assert!(p.ends_with(&format!("{}... [content truncated]", "a".repeat(10))));
    }
}

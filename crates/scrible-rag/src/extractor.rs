//! Local file extraction: plain text and caption files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use scrible_core::traits::ContentExtractor;
use scrible_core::types::{DocumentKind, DocumentSource, Extracted, Meta};
use serde_json::Value;
use walkdir::WalkDir;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];
const CAPTION_EXTENSIONS: &[&str] = &["srt", "vtt"];

/// Reads `.txt`/`.md` as-is and strips cue numbers, timestamps and tags from `.srt`/`.vtt`.
#[derive(Debug, Default, Clone)]
pub struct FileExtractor;

/// Caption text joined into one line: drops markup lines, `-->` timings, cue numbers and blanks.
pub fn parse_subtitle_content(subtitle_text: &str) -> String {
    subtitle_text
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with('<')
                && !line.contains("-->")
                && !line.chars().all(|c| c.is_ascii_digit())
                && *line != "WEBVTT"
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn extension(path: &Path) -> Option<String> { path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()) }

fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|e| TEXT_EXTENSIONS.contains(&e.as_str()) || CAPTION_EXTENSIONS.contains(&e.as_str()))
}

#[async_trait]
impl ContentExtractor for FileExtractor {
    async fn extract(&self, source: &DocumentSource) -> anyhow::Result<Extracted> {
        let path = PathBuf::from(&source.location);
        let Some(ext) = extension(&path) else { bail!("{} has no file extension", path.display()) };
        let bytes = tokio::fs::read(&path).await.with_context(|| format!("reading {}", path.display()))?;
        let raw = String::from_utf8_lossy(&bytes);

        let (content, method) = if CAPTION_EXTENSIONS.contains(&ext.as_str()) {
            (parse_subtitle_content(&raw), "subtitles")
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            (raw.into_owned(), "plain-text")
        } else {
            bail!("unsupported file type .{ext}");
        };

        let mut metadata = Meta::new();
        let title = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| source.name.clone());
        metadata.insert("title".into(), Value::from(title));
        metadata.insert("path".into(), Value::from(path.display().to_string()));
        metadata.insert("word_count".into(), Value::from(content.split_whitespace().count()));
        metadata.insert("extraction_method".into(), Value::from(method));
        Ok(Extracted { content, metadata })
    }
}

/// Supported files under `dir`, sorted by path, as document sources.
///
/// The document ID is the path relative to `dir` without its extension.
pub fn discover_documents(dir: &Path) -> Vec<DocumentSource> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let rel = path.strip_prefix(dir).unwrap_or(&path);
            let doc_id = rel.with_extension("").to_string_lossy().replace('\\', "/");
            let kind = match extension(&path).as_deref() {
                Some("srt") | Some("vtt") => DocumentKind::Video,
                _ => DocumentKind::Text,
            };
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| doc_id.clone());
            DocumentSource { doc_id, name, kind, location: path.display().to_string() }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitle_parsing_drops_cues_and_timestamps() {
        let srt = "1\n00:00:01,000 --> 00:00:03,000\nHello there.\n\n2\n00:00:03,500 --> 00:00:05,000\n<i>General Kenobi.</i>\n";
        assert_eq!(parse_subtitle_content(srt), "Hello there.");
        let vtt = "WEBVTT\n\n00:01.000 --> 00:04.000\nNever drink liquid nitrogen.\n\n00:05.000 --> 00:09.000\nIt will perforate your stomach.";
        assert_eq!(parse_subtitle_content(vtt), "Never drink liquid nitrogen. It will perforate your stomach.");
    }
}

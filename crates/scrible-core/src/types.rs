//! Domain types shared by the chunker, the vector index and the retrieval engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form provenance attached by an extractor (title, url, page count, ...).
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Kind of source a document came from.
///
/// Serialized as a lowercase string; unknown kinds round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentKind {
    Pdf,
    Web,
    Video,
    Text,
    Other(String),
}

impl DocumentKind {
    pub fn as_str(&self) -> &str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Web => "web",
            DocumentKind::Video => "video",
            DocumentKind::Text => "text",
            DocumentKind::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for DocumentKind {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => DocumentKind::Pdf,
            "web" => DocumentKind::Web,
            "video" => DocumentKind::Video,
            "text" => DocumentKind::Text,
            _ => DocumentKind::Other(s),
        }
    }
}

impl From<&str> for DocumentKind {
    fn from(s: &str) -> Self { DocumentKind::from(s.to_string()) }
}

impl From<DocumentKind> for String {
    fn from(k: DocumentKind) -> Self { k.as_str().to_string() }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A document waiting to be ingested.
///
/// - `doc_id`: stable identity, unique within the corpus
/// - `name`: display name used in answers and citations
/// - `location`: path or URL handed to the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSource {
    pub doc_id: String,
    pub name: String,
    pub kind: DocumentKind,
    pub location: String,
}

/// Raw text plus provenance returned by a content extractor.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub content: String,
    pub metadata: Meta,
}

/// A contiguous, sentence-aligned span of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub sentence_count: usize,
    pub char_count: usize,
    pub start_sentence: String,
    pub end_sentence: String,
    pub sentences: Vec<String>,
    /// Leading sentences carried over from the previous chunk.
    pub overlap: usize,
}

/// One persisted row per chunk, joined to the vector index by `embedding_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    pub document_name: String,
    pub document_type: DocumentKind,
    pub content: String,
    pub sentence_count: usize,
    pub char_count: usize,
    pub embedding_id: i64,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<Meta>,
}

impl ChunkRecord {
    pub fn chunk_id_for(doc_id: &str, index: usize) -> String { format!("{doc_id}_chunk_{index}") }
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub content: String,
    pub document_name: String,
    pub document_type: DocumentKind,
    pub chunk_index: usize,
    pub similarity_score: f32,
    pub doc_id: String,
    pub chunk_id: String,
    pub metadata: Option<Meta>,
}

impl ResultItem {
    pub fn from_record(record: &ChunkRecord, score: f32) -> Self {
        Self {
            content: record.content.clone(),
            document_name: record.document_name.clone(),
            document_type: record.document_type.clone(),
            chunk_index: record.chunk_index,
            similarity_score: score,
            doc_id: record.doc_id.clone(),
            chunk_id: record.chunk_id.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSource {
    pub document: String,
    pub document_type: DocumentKind,
    pub similarity: f32,
    pub excerpt: String,
}

/// Synthesized answer. `confidence` is the top similarity clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<AnswerSource>,
    pub confidence: f32,
}

/// Outcome of ingesting a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestReport {
    Completed {
        doc_id: String,
        chunks_created: usize,
        embedding_ids: Vec<i64>,
        summary: String,
        key_points: Vec<String>,
    },
    Failed {
        doc_id: String,
        error: String,
    },
}

impl IngestReport {
    pub fn doc_id(&self) -> &str {
        match self {
            IngestReport::Completed { doc_id, .. } | IngestReport::Failed { doc_id, .. } => doc_id,
        }
    }

    pub fn is_completed(&self) -> bool { matches!(self, IngestReport::Completed { .. }) }
}

/// Informational snapshot statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub embedding_dimension: Option<usize>,
    pub index_type: String,
    pub last_updated: DateTime<Utc>,
}

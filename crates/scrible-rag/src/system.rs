//! The explicitly constructed owner of the index, the metadata and the collaborators.
//!
//! Ingestion does its async work (extraction, embedding, summarization) outside
//! the corpus lock and then commits each document under one write lock. Queries
//! embed outside the lock and rank under a read lock.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use scrible_core::chunker;
use scrible_core::traits::{ContentExtractor, Embedder, LlmClient};
use scrible_core::types::{Answer, Chunk, ChunkRecord, DocumentSource, IngestReport, Meta, ResultItem, Stats};
use scrible_core::{Error, Result, Settings};
use scrible_vector::snapshot;
use scrible_vector::{HnswParams, MetadataStore, VectorIndex};

use crate::answer;
use crate::engine::RetrievalEngine;
use crate::extractor::FileExtractor;
use crate::insights;

/// Index and metadata, always mutated together.
#[derive(Debug)]
pub struct Corpus {
    pub index: VectorIndex,
    pub store: MetadataStore,
    next_id: i64,
}

/// A document that has been extracted, chunked and embedded but not yet committed.
pub struct PreparedDocument {
    pub source: DocumentSource,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
    pub metadata: Meta,
    pub processed_at: DateTime<Utc>,
}

impl Corpus {
    pub fn new(params: HnswParams) -> Self { Self { index: VectorIndex::new(params), store: MetadataStore::new(), next_id: 0 } }

    /// Wrap a loaded pair. IDs continue after the index's high-water mark, so removed IDs are never reused.
    pub fn from_parts(index: VectorIndex, store: MetadataStore) -> Self {
        let next_id = index.next_id().max(store.max_embedding_id().map_or(0, |m| m + 1));
        Self { index, store, next_id }
    }

    pub fn next_id(&self) -> i64 { self.next_id }

    /// Add a document's vectors and records as one unit. On error nothing changes.
    pub fn commit(&mut self, doc: PreparedDocument) -> Result<Vec<i64>> {
        if doc.chunks.len() != doc.vectors.len() {
            return Err(Error::IndexInconsistency(format!(
                "{}: {} chunks but {} vectors",
                doc.source.doc_id,
                doc.chunks.len(),
                doc.vectors.len()
            )));
        }
        if self.store.contains_document(&doc.source.doc_id) {
            return Err(Error::DuplicateDocument(doc.source.doc_id));
        }

        let ids: Vec<i64> = (self.next_id..).take(doc.chunks.len()).collect();
        let metadata = (!doc.metadata.is_empty()).then_some(doc.metadata);
        let records: Vec<ChunkRecord> = doc
            .chunks
            .iter()
            .zip(&ids)
            .enumerate()
            .map(|(i, (chunk, &id))| ChunkRecord {
                doc_id: doc.source.doc_id.clone(),
                chunk_id: ChunkRecord::chunk_id_for(&doc.source.doc_id, i),
                chunk_index: i,
                document_name: doc.source.name.clone(),
                document_type: doc.source.kind.clone(),
                content: chunk.text.clone(),
                sentence_count: chunk.sentence_count,
                char_count: chunk.char_count,
                embedding_id: id,
                processed_at: doc.processed_at,
                metadata: metadata.clone(),
            })
            .collect();

        self.index.validate_batch(&ids, &doc.vectors)?;
        if let Some(&taken) = ids.iter().find(|id| self.store.find_by_embedding_id(**id).is_some()) {
            return Err(Error::IndexInconsistency(format!("embedding id {taken} already has a metadata record")));
        }

        self.index.add(&ids, &doc.vectors)?;
        if let Err(e) = self.store.append_batch(records) {
            self.index.remove(&ids);
            return Err(e);
        }
        self.next_id += ids.len() as i64;
        Ok(ids)
    }

    /// Remove every chunk of `doc_id`; returns how many were removed.
    pub fn remove_document(&mut self, doc_id: &str) -> Result<usize> {
        let ids = self.store.remove_document(doc_id);
        if ids.is_empty() {
            return Err(Error::NotFound(format!("document {doc_id}")));
        }
        let removed = self.index.remove(&ids);
        if removed != ids.len() {
            return Err(Error::IndexInconsistency(format!(
                "document {doc_id}: {} records but only {removed} index entries",
                ids.len()
            )));
        }
        Ok(removed)
    }
}

pub struct RagSystem {
    settings: Settings,
    corpus: RwLock<Corpus>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn ContentExtractor>,
    llm: Option<Arc<dyn LlmClient>>,
    halted: AtomicBool,
}

impl RagSystem {
    /// Empty system. Local files are extracted with [`FileExtractor`] unless replaced.
    pub fn new(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        let corpus = Corpus::new(HnswParams::from(&settings.index));
        Ok(Self::assemble(settings, embedder, corpus))
    }

    /// Load the snapshot in `dir`; a directory without one starts empty.
    pub fn open(settings: Settings, embedder: Arc<dyn Embedder>, dir: &Path) -> Result<Self> {
        settings.validate()?;
        let (index, store) = snapshot::load(dir, HnswParams::from(&settings.index))?;
        if let Some(dim) = index.dimension() {
            if dim != embedder.dim() {
                return Err(Error::Snapshot(format!(
                    "snapshot dimension {dim} does not match embedder {} ({})",
                    embedder.embedder_id(),
                    embedder.dim()
                )));
            }
        }
        Ok(Self::assemble(settings, embedder, Corpus::from_parts(index, store)))
    }

    fn assemble(settings: Settings, embedder: Arc<dyn Embedder>, corpus: Corpus) -> Self {
        Self {
            settings,
            corpus: RwLock::new(corpus),
            embedder,
            extractor: Arc::new(FileExtractor),
            llm: None,
            halted: AtomicBool::new(false),
        }
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmClient>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn writes_halted(&self) -> bool { self.halted.load(Ordering::SeqCst) }

    /// Re-enable writes after an inconsistency has been inspected.
    pub fn resume_writes(&self) {
        if self.halted.swap(false, Ordering::SeqCst) {
            tracing::warn!("writes resumed after index inconsistency");
        }
    }

    fn read_corpus(&self) -> Result<RwLockReadGuard<'_, Corpus>> {
        self.corpus.read().map_err(|_| Error::IndexInconsistency("corpus lock poisoned".into()))
    }

    fn write_corpus(&self) -> Result<RwLockWriteGuard<'_, Corpus>> {
        self.corpus.write().map_err(|_| Error::IndexInconsistency("corpus lock poisoned".into()))
    }

    /// Record an error; inconsistencies halt further writes.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_inconsistency() {
                tracing::error!(error = %e, "index inconsistency, halting writes");
                self.halted.store(true, Ordering::SeqCst);
            }
        }
        result
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writes_halted() { Err(Error::WritesHalted) } else { Ok(()) }
    }

    async fn with_timeout<T, F>(&self, secs: u64, what: &str, fut: F) -> Result<anyhow::Result<T>>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| Error::Timeout(format!("{what} exceeded {secs}s")))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .with_timeout(self.settings.timeouts.embed_secs, "embedding", self.embedder.embed_batch(texts))
            .await?
            .map_err(|e| Error::Embedding(format!("{e:#}")))?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!("embedder returned {} vectors for {} texts", vectors.len(), texts.len())));
        }
        vectors.into_iter().map(normalize).collect()
    }

    /// Ask the LLM, if any. `None` on absence, failure or timeout.
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let temperature = self.settings.answer.temperature;
        match self.with_timeout(self.settings.timeouts.llm_secs, "llm", llm.complete(system, user, max_tokens, temperature)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                tracing::warn!("⚠️ LLM returned an empty completion, using fallback");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %format!("{e:#}"), "⚠️ LLM call failed, using fallback");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "⚠️ LLM call timed out, using fallback");
                None
            }
        }
    }

    /// Ingest documents in order. A failed document does not stop the batch.
    pub async fn ingest(&self, sources: &[DocumentSource]) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(sources.len());
        for source in sources {
            let report = match self.ingest_one(source).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(doc_id = %source.doc_id, error = %e, "❌ document failed");
                    IngestReport::Failed { doc_id: source.doc_id.clone(), error: e.to_string() }
                }
            };
            reports.push(report);
        }
        reports
    }

    /// Extract, chunk, embed, summarize and commit one document.
    pub async fn ingest_one(&self, source: &DocumentSource) -> Result<IngestReport> {
        self.ensure_writable()?;
        if self.read_corpus()?.store.contains_document(&source.doc_id) {
            return Err(Error::DuplicateDocument(source.doc_id.clone()));
        }
        tracing::info!(doc_id = %source.doc_id, kind = %source.kind, "🔄 Processing document");

        let extracted = self
            .extractor
            .extract(source)
            .await
            .map_err(|e| Error::Extraction(format!("{}: {e:#}", source.location)))?;
        let chunks = chunker::chunk(&extracted.content, self.settings.chunking.chunk_size, self.settings.chunking.overlap_sentences);
        if chunks.is_empty() {
            return Err(Error::Extraction(format!("{}: no text content", source.location)));
        }
        tracing::debug!(doc_id = %source.doc_id, chunks = chunks.len(), "📝 chunked");

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(&texts).await?;

        let (summary, key_points) = self.describe(source, &extracted.content, &extracted.metadata).await;

        let prepared = PreparedDocument {
            source: source.clone(),
            chunks,
            vectors,
            metadata: extracted.metadata,
            processed_at: Utc::now(),
        };
        let chunks_created = prepared.chunks.len();
        let ids = {
            self.ensure_writable()?;
            let mut corpus = self.write_corpus()?;
            let committed = corpus.commit(prepared);
            drop(corpus);
            self.observe(committed)?
        };
        tracing::info!(doc_id = %source.doc_id, chunks = chunks_created, "✅ Document indexed");

        Ok(IngestReport::Completed { doc_id: source.doc_id.clone(), chunks_created, embedding_ids: ids, summary, key_points })
    }

    async fn describe(&self, source: &DocumentSource, content: &str, metadata: &Meta) -> (String, Vec<String>) {
        let title = metadata.get("title").and_then(|v| v.as_str()).unwrap_or(source.name.as_str()).to_string();
        let kind = source.kind.to_string();
        let max_chars = self.settings.answer.max_context_chars;

        let summary_prompt = insights::summary_user_prompt(&title, &kind, content, max_chars);
        let summary = match self.complete(insights::SUMMARY_SYSTEM_PROMPT, &summary_prompt, insights::SUMMARY_MAX_TOKENS).await {
            Some(s) => s,
            None => insights::fallback_summary(content, &kind, &title),
        };

        let points_prompt = insights::key_points_user_prompt(content, max_chars);
        let key_points = match self.complete(insights::KEY_POINTS_SYSTEM_PROMPT, &points_prompt, insights::KEY_POINTS_MAX_TOKENS).await {
            Some(text) => {
                let parsed = insights::parse_key_points(&text);
                if parsed.is_empty() { insights::fallback_key_points(content) } else { parsed }
            }
            None => insights::fallback_key_points(content),
        };
        (summary, key_points)
    }

    /// Remove a document's chunks from index and metadata.
    pub fn remove_document(&self, doc_id: &str) -> Result<usize> {
        self.ensure_writable()?;
        let mut corpus = self.write_corpus()?;
        let removed = corpus.remove_document(doc_id);
        drop(corpus);
        self.observe(removed)
    }

    /// Top-`k` chunks for `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ResultItem>> {
        if query.trim().is_empty() {
            return Err(Error::Query("empty query".into()));
        }
        if k == 0 || self.read_corpus()?.index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .embed(&[query.to_string()])
            .await
            .map_err(|e| match e {
                Error::Embedding(msg) => Error::Query(format!("query embedding failed: {msg}")),
                other => other,
            })?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Query("embedder returned no vector".into()))?;

        let corpus = self.read_corpus()?;
        let ranked = RetrievalEngine::new(&corpus.index, &corpus.store).rank(&vector, k);
        drop(corpus);
        self.observe(ranked)
    }

    /// Retrieve and synthesize an answer; falls back to excerpts without a working LLM.
    pub async fn answer(&self, question: &str, k: usize) -> Result<Answer> {
        let results = self.search(question, k).await?;
        let settings = &self.settings.answer;
        if results.is_empty() {
            return Ok(Answer { answer: answer::NO_INFORMATION.to_string(), sources: Vec::new(), confidence: 0.0 });
        }

        let context = answer::build_context(&results, settings.max_context_chars);
        let user = answer::user_prompt(&context, question);
        let text = match self.complete(answer::SYSTEM_PROMPT, &user, settings.max_tokens).await {
            Some(text) => text,
            None => answer::fallback_answer(question, &results, settings),
        };

        Ok(Answer {
            answer: text,
            sources: answer::sources(&results, settings.excerpt_chars),
            confidence: answer::confidence(&results),
        })
    }

    pub fn stats(&self) -> Result<Stats> {
        let corpus = self.read_corpus()?;
        Ok(snapshot::stats_for(&corpus.index, &corpus.store))
    }

    /// Document IDs in first-ingested order.
    pub fn documents(&self) -> Result<Vec<String>> { Ok(self.read_corpus()?.store.document_ids()) }

    /// Write the index/metadata pair and stats to `dir`.
    pub fn save(&self, dir: &Path) -> Result<Stats> {
        let corpus = self.read_corpus()?;
        snapshot::save(dir, &corpus.index, &corpus.store)
    }
}

/// Scale an embedder vector to unit L2 norm.
fn normalize(mut v: Vec<f32>) -> Result<Vec<f32>> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return Err(Error::Embedding(format!("embedder returned a vector with norm {norm}")));
    }
    v.iter_mut().for_each(|x| *x /= norm);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrible_core::types::DocumentKind;

    fn source(id: &str) -> DocumentSource {
        DocumentSource { doc_id: id.into(), name: format!("{id}.txt"), kind: DocumentKind::Text, location: id.into() }
    }

    fn prepared(id: &str, vectors: Vec<Vec<f32>>) -> PreparedDocument {
        let chunks = chunker::chunk(&"Alpha beta. ".repeat(vectors.len()), 5, 0);
        PreparedDocument { source: source(id), chunks, vectors, metadata: Meta::new(), processed_at: Utc::now() }
    }

    #[test]
    fn commit_assigns_sequential_ids_and_keeps_parity() {
        let mut corpus = Corpus::new(HnswParams::default());
        let ids = corpus.commit(prepared("a", vec![vec![1.0, 0.0], vec![0.0, 1.0]])).unwrap();
        assert_eq!(ids, vec![0, 1]);
        let ids = corpus.commit(prepared("b", vec![vec![0.6, 0.8]])).unwrap();
        assert_eq!(ids, vec![2]);
        snapshot::verify_parity(&corpus.index, &corpus.store).unwrap();
        assert_eq!(corpus.store.find_by_embedding_id(2).unwrap().chunk_id, "b_chunk_0");
    }

    #[test]
    fn rejected_commit_leaves_corpus_unchanged() {
        let mut corpus = Corpus::new(HnswParams::default());
        corpus.commit(prepared("a", vec![vec![1.0, 0.0]])).unwrap();
        let err = corpus.commit(prepared("b", vec![vec![0.0, 1.0], vec![3.0, 4.0]])).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert!(matches!(corpus.commit(prepared("a", vec![vec![0.0, 1.0]])), Err(Error::DuplicateDocument(_))));
        assert_eq!(corpus.index.len(), 1);
        assert_eq!(corpus.store.len(), 1);
        assert_eq!(corpus.next_id(), 1);
    }

    #[test]
    fn ids_resume_after_largest_loaded_id() {
        let mut corpus = Corpus::new(HnswParams::default());
        corpus.commit(prepared("a", vec![vec![1.0, 0.0], vec![0.0, 1.0]])).unwrap();
        let index = VectorIndex::from_bytes(corpus.index.header(), &corpus.index.to_bytes().unwrap()).unwrap();
        let reloaded = Corpus::from_parts(index, corpus.store.clone());
        assert_eq!(reloaded.next_id(), 2);
    }

    #[test]
    fn ids_of_removed_tail_are_not_reused() {
        let mut corpus = Corpus::new(HnswParams::default());
        corpus.commit(prepared("a", vec![vec![1.0, 0.0]])).unwrap();
        corpus.commit(prepared("b", vec![vec![0.0, 1.0], vec![0.6, 0.8]])).unwrap();
        corpus.remove_document("b").unwrap();
        let index = VectorIndex::from_bytes(corpus.index.header(), &corpus.index.to_bytes().unwrap()).unwrap();
        let mut reloaded = Corpus::from_parts(index, corpus.store.clone());
        assert_eq!(reloaded.next_id(), 3);
        assert_eq!(reloaded.commit(prepared("c", vec![vec![0.0, 1.0]])).unwrap(), vec![3]);
    }

    #[test]
    fn normalize_scales_to_unit_length() {
        let v = normalize(vec![3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert!(matches!(normalize(vec![0.0, 0.0]), Err(Error::Embedding(_))));
        assert!(matches!(normalize(vec![f32::NAN, 1.0]), Err(Error::Embedding(_))));
    }

    #[tokio::test]
    async fn inconsistency_halts_writes_until_resumed() {
        let embedder = Arc::new(unit_embedder::Unit);
        let system = RagSystem::new(Settings::default(), embedder).unwrap();
        let halted: Result<()> = system.observe(Err(Error::IndexInconsistency("test".into())));
        assert!(halted.is_err());
        assert!(system.writes_halted());
        assert!(matches!(system.ingest_one(&source("x")).await, Err(Error::WritesHalted)));
        assert!(matches!(system.remove_document("x"), Err(Error::WritesHalted)));
        system.resume_writes();
        assert!(!system.writes_halted());
    }

    mod unit_embedder {
        use async_trait::async_trait;
        use scrible_core::traits::Embedder;

        pub struct Unit;

        #[async_trait]
        impl Embedder for Unit {
            fn dim(&self) -> usize { 2 }
            fn embedder_id(&self) -> String { "unit".into() }
            async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }
    }
}

use std::collections::{HashMap, HashSet};

use scrible_core::types::ChunkRecord;
use scrible_core::{Error, Result};

/// Ordered chunk records with O(1) lookup by embedding ID and by document.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    records: Vec<ChunkRecord>,
    positions: HashMap<i64, usize>,
    doc_chunks: HashMap<String, usize>,
}

impl MetadataStore {
    pub fn new() -> Self { Self::default() }

    /// Build from persisted records, rejecting repeated embedding IDs.
    pub fn from_records(records: Vec<ChunkRecord>) -> Result<Self> {
        let mut store = Self::new();
        store.append_batch(records)?;
        Ok(store)
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn all(&self) -> &[ChunkRecord] { &self.records }

    pub fn find_by_embedding_id(&self, id: i64) -> Option<&ChunkRecord> {
        self.positions.get(&id).map(|&pos| &self.records[pos])
    }

    pub fn append(&mut self, record: ChunkRecord) -> Result<()> { self.append_batch(vec![record]) }

    /// Append all records or none of them.
    pub fn append_batch(&mut self, records: Vec<ChunkRecord>) -> Result<()> {
        let mut seen = HashSet::with_capacity(records.len());
        for r in &records {
            if self.positions.contains_key(&r.embedding_id) || !seen.insert(r.embedding_id) {
                return Err(Error::IndexInconsistency(format!(
                    "embedding id {} already used (chunk {})",
                    r.embedding_id, r.chunk_id
                )));
            }
        }
        for r in records {
            self.positions.insert(r.embedding_id, self.records.len());
            *self.doc_chunks.entry(r.doc_id.clone()).or_default() += 1;
            self.records.push(r);
        }
        Ok(())
    }

    /// Drop every record of `doc_id`; returns their embedding IDs.
    pub fn remove_document(&mut self, doc_id: &str) -> Vec<i64> {
        let mut removed = Vec::new();
        self.records.retain(|r| {
            if r.doc_id == doc_id {
                removed.push(r.embedding_id);
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.doc_chunks.remove(doc_id);
            self.positions = self.records.iter().enumerate().map(|(i, r)| (r.embedding_id, i)).collect();
        }
        removed
    }

    /// Distinct document IDs in first-ingested order.
    pub fn document_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.doc_id.as_str()))
            .map(|r| r.doc_id.clone())
            .collect()
    }

    pub fn contains_document(&self, doc_id: &str) -> bool { self.doc_chunks.contains_key(doc_id) }

    /// Number of chunks stored for `doc_id`.
    pub fn chunk_count(&self, doc_id: &str) -> usize { self.doc_chunks.get(doc_id).copied().unwrap_or(0) }

    pub fn document_count(&self) -> usize { self.doc_chunks.len() }

    pub fn max_embedding_id(&self) -> Option<i64> { self.positions.keys().copied().max() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scrible_core::types::DocumentKind;

    fn record(doc: &str, idx: usize, id: i64) -> ChunkRecord {
        ChunkRecord {
            doc_id: doc.into(),
            chunk_id: ChunkRecord::chunk_id_for(doc, idx),
            chunk_index: idx,
            document_name: doc.to_uppercase(),
            document_type: DocumentKind::Text,
            content: format!("chunk {idx} of {doc}"),
            sentence_count: 1,
            char_count: 10,
            embedding_id: id,
            processed_at: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn lookup_and_order() {
        let mut s = MetadataStore::new();
        s.append_batch(vec![record("a", 0, 5), record("a", 1, 6), record("b", 0, 7)]).unwrap();
        assert_eq!(s.find_by_embedding_id(6).unwrap().chunk_id, "a_chunk_1");
        assert_eq!(s.document_ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(s.max_embedding_id(), Some(7));
    }

    #[test]
    fn colliding_batch_changes_nothing() {
        let mut s = MetadataStore::new();
        s.append(record("a", 0, 1)).unwrap();
        let err = s.append_batch(vec![record("b", 0, 2), record("b", 1, 1)]).unwrap_err();
        assert!(err.is_inconsistency());
        assert_eq!(s.len(), 1);
        assert!(s.find_by_embedding_id(2).is_none());
    }

    #[test]
    fn remove_document_reindexes_positions() {
        let mut s = MetadataStore::new();
        s.append_batch(vec![record("a", 0, 1), record("b", 0, 2), record("a", 1, 3), record("c", 0, 4)]).unwrap();
        let mut removed = s.remove_document("a");
        removed.sort();
        assert_eq!(removed, vec![1, 3]);
        assert_eq!(s.find_by_embedding_id(4).unwrap().doc_id, "c");
        assert!(!s.contains_document("a"));
        assert_eq!(s.len(), 2);
        assert_eq!(s.document_count(), 2);
    }

    #[test]
    fn document_counts_follow_appends_and_removals() {
        let mut s = MetadataStore::new();
        s.append_batch(vec![record("a", 0, 1), record("a", 1, 2), record("b", 0, 3)]).unwrap();
        assert_eq!(s.chunk_count("a"), 2);
        assert_eq!(s.chunk_count("b"), 1);
        assert_eq!(s.chunk_count("c"), 0);
        assert!(s.contains_document("b"));

        s.append_batch(vec![record("c", 0, 9), record("c", 1, 1)]).unwrap_err();
        assert!(!s.contains_document("c"));

        s.remove_document("a");
        assert_eq!(s.chunk_count("a"), 0);
        assert_eq!(s.document_count(), 1);
    }
}

use scrible_core::types::ResultItem;
use scrible_core::{Error, Result};
use scrible_vector::{MetadataStore, VectorIndex};

/// Joins index hits with their chunk records.
pub struct RetrievalEngine<'a> {
    index: &'a VectorIndex,
    store: &'a MetadataStore,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(index: &'a VectorIndex, store: &'a MetadataStore) -> Self { Self { index, store } }

    /// Top-`k` results in the index's order. A hit without a record is an inconsistency, never skipped.
    pub fn rank(&self, query: &[f32], k: usize) -> Result<Vec<ResultItem>> {
        let hits = self.index.search(query, k)?;
        hits.into_iter()
            .map(|(id, score)| match self.store.find_by_embedding_id(id) {
                Some(record) => Ok(ResultItem::from_record(record, score)),
                None => {
                    tracing::error!(embedding_id = id, "index hit has no metadata record");
                    Err(Error::IndexInconsistency(format!("embedding id {id} has no metadata record")))
                }
            })
            .collect()
    }
}

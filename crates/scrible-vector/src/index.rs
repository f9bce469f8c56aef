//! External-ID vector index backed by a usearch HNSW graph.
//!
//! Callers address vectors by non-negative `i64` IDs, stored in usearch as `u64`
//! keys. Batches are validated in full before anything is inserted, so a
//! rejected `add` leaves the index exactly as it was. Similarity is the inner
//! product of unit vectors; usearch reports `1 - dot` as the distance.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use scrible_core::config::IndexSettings;
use scrible_core::{Error, Result};
use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

const CHECKSUM_LEN: usize = 32;
const NORM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Graph connectivity (neighbors per node).
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self { Self { m: 32, ef_construction: 200, ef_search: 100 } }
}

impl From<&IndexSettings> for HnswParams {
    fn from(s: &IndexSettings) -> Self { Self { m: s.m, ef_construction: s.ef_construction, ef_search: s.ef_search } }
}

/// Everything needed to restore an index next to its usearch blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub params: HnswParams,
    pub dimension: Option<usize>,
    /// Smallest ID never handed to `add`, removed IDs included.
    pub next_id: i64,
    pub ids: Vec<i64>,
}

fn open_graph(params: HnswParams, dim: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions: dim,
        metric: MetricKind::IP,
        quantization: ScalarKind::F32,
        connectivity: params.m,
        expansion_add: params.ef_construction,
        expansion_search: params.ef_search,
        ..Default::default()
    };
    Index::new(&options).map_err(|e| Error::IndexInconsistency(format!("creating usearch index: {e}")))
}

pub struct VectorIndex {
    params: HnswParams,
    dim: Option<usize>,
    graph: Option<Index>,
    live: BTreeSet<i64>,
    next_id: i64,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("params", &self.params)
            .field("dim", &self.dim)
            .field("len", &self.live.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Empty index whose dimension is fixed by the first `add`.
    pub fn new(params: HnswParams) -> Self { Self { params, dim: None, graph: None, live: BTreeSet::new(), next_id: 0 } }

    pub fn with_dimension(dim: usize, params: HnswParams) -> Self { Self { dim: Some(dim), ..Self::new(params) } }

    pub fn params(&self) -> HnswParams { self.params }

    pub fn dimension(&self) -> Option<usize> { self.dim }

    /// Live (non-removed) entries.
    pub fn len(&self) -> usize { self.live.len() }

    pub fn is_empty(&self) -> bool { self.live.is_empty() }

    pub fn contains(&self, id: i64) -> bool { self.live.contains(&id) }

    /// Live IDs in ascending order.
    pub fn ids(&self) -> Vec<i64> { self.live.iter().copied().collect() }

    /// One past the largest ID ever added, whether or not it was removed since.
    pub fn next_id(&self) -> i64 { self.next_id }

    /// Search beam width used once the index outgrows exhaustive ranking.
    pub fn set_ef_search(&mut self, ef_search: usize) {
        self.params.ef_search = ef_search;
        if let Some(g) = self.graph.as_ref() {
            g.change_expansion_search(ef_search);
        }
    }

    /// Check a batch without touching the index.
    pub fn validate_batch(&self, ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(Error::IndexInconsistency(format!("{} ids for {} vectors", ids.len(), vectors.len())));
        }
        let Some(first) = vectors.first() else { return Ok(()) };
        let dim = self.dim.unwrap_or(first.len());
        if dim == 0 {
            return Err(Error::Embedding("vectors must have at least one dimension".into()));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        for (&id, v) in ids.iter().zip(vectors) {
            if id < 0 {
                return Err(Error::IndexInconsistency(format!("negative id {id}")));
            }
            if !seen.insert(id) {
                return Err(Error::IndexInconsistency(format!("id {id} repeated within batch")));
            }
            if self.live.contains(&id) {
                return Err(Error::IndexInconsistency(format!("id {id} already present in index")));
            }
            if v.len() != dim {
                return Err(Error::Embedding(format!("id {id}: expected dimension {dim}, got {}", v.len())));
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(Error::Embedding(format!("id {id}: vector has non-finite components")));
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm == 0.0 {
                return Err(Error::Embedding(format!("id {id}: zero-norm vector")));
            }
            if (norm - 1.0).abs() > NORM_TOLERANCE {
                return Err(Error::Embedding(format!("id {id}: vector is not unit-normalized (norm {norm:.4})")));
            }
        }
        Ok(())
    }

    /// Insert a batch under caller-chosen IDs. All-or-nothing.
    pub fn add(&mut self, ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        self.validate_batch(ids, vectors)?;
        let Some(first) = vectors.first() else { return Ok(()) };
        let dim = self.dim.unwrap_or(first.len());
        let created = self.graph.is_none();
        let graph = match self.graph.take() {
            Some(g) => g,
            None => open_graph(self.params, dim)?,
        };
        if let Err(e) = Self::insert_all(&graph, ids, vectors) {
            if !created {
                self.graph = Some(graph);
            }
            return Err(e);
        }
        self.graph = Some(graph);
        self.dim = Some(dim);
        self.live.extend(ids.iter().copied());
        if let Some(&max) = ids.iter().max() {
            self.next_id = self.next_id.max(max + 1);
        }
        tracing::debug!(added = ids.len(), total = self.live.len(), "vectors added");
        Ok(())
    }

    /// Reserve room and insert; on failure the keys inserted so far are removed again.
    fn insert_all(graph: &Index, ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        graph
            .reserve(graph.capacity() + ids.len())
            .map_err(|e| Error::IndexInconsistency(format!("reserving capacity: {e}")))?;
        for (n, (&id, v)) in ids.iter().zip(vectors).enumerate() {
            if let Err(e) = graph.add(id as u64, v.as_slice()) {
                for &done in &ids[..n] {
                    let _ = graph.remove(done as u64);
                }
                return Err(Error::IndexInconsistency(format!("inserting id {id}: {e}")));
            }
        }
        Ok(())
    }

    /// Top-`k` `(id, score)` pairs by inner product, score descending, ties by ascending id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        let (Some(graph), Some(dim)) = (self.graph.as_ref(), self.dim) else { return Ok(Vec::new()) };
        if k == 0 || self.live.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != dim {
            return Err(Error::Query(format!("query dimension {} does not match index dimension {dim}", query.len())));
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(Error::Query("query vector has non-finite components".into()));
        }

        let live = self.live.len();
        let matches = if k >= live || live <= self.params.ef_search {
            // Capacity bounds every slot ever filled, removed ones included.
            graph.exact_search(query, graph.capacity().max(live))
        } else {
            graph.search(query, k)
        }
        .map_err(|e| Error::Query(format!("usearch search failed: {e}")))?;

        let mut hits: Vec<(i64, f32)> = matches
            .keys
            .iter()
            .zip(&matches.distances)
            .map(|(&key, &distance)| (key as i64, 1.0 - distance))
            .filter(|(id, _)| self.live.contains(id))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Remove the given IDs. Unknown IDs are ignored; returns how many were removed.
    pub fn remove(&mut self, ids: &[i64]) -> usize {
        let mut removed = 0;
        for id in ids {
            if !self.live.remove(id) {
                continue;
            }
            if let Some(g) = self.graph.as_ref() {
                if let Err(e) = g.remove(*id as u64) {
                    tracing::warn!(id, error = %e, "usearch remove failed; id stays unmapped");
                }
            }
            removed += 1;
        }
        removed
    }

    pub fn header(&self) -> IndexHeader {
        IndexHeader { params: self.params, dimension: self.dim, next_id: self.next_id, ids: self.ids() }
    }

    /// The usearch serialization followed by its blake3 checksum.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = match self.graph.as_ref() {
            Some(g) => {
                let mut buf = vec![0u8; g.serialized_length()];
                g.save_to_buffer(&mut buf).map_err(|e| Error::Snapshot(format!("serializing index: {e}")))?;
                buf
            }
            None => Vec::new(),
        };
        let checksum = blake3::hash(&out);
        out.extend_from_slice(checksum.as_bytes());
        Ok(out)
    }

    /// Rebuild from a header and the bytes written by [`VectorIndex::to_bytes`].
    pub fn from_bytes(header: IndexHeader, data: &[u8]) -> Result<Self> {
        if data.len() < CHECKSUM_LEN {
            return Err(Error::Snapshot("index blob is truncated".into()));
        }
        let (body, trailer) = data.split_at(data.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != trailer {
            return Err(Error::Snapshot("index checksum mismatch".into()));
        }

        let mut index = VectorIndex::new(header.params);
        index.dim = header.dimension;
        index.next_id = header.next_id;
        let Some(dim) = header.dimension else {
            if !header.ids.is_empty() || !body.is_empty() {
                return Err(Error::Snapshot("index without a dimension holds entries".into()));
            }
            return Ok(index);
        };
        if body.is_empty() {
            if !header.ids.is_empty() {
                return Err(Error::Snapshot(format!("header lists {} ids but the index blob is empty", header.ids.len())));
            }
            return Ok(index);
        }

        let graph = open_graph(header.params, dim)?;
        graph.load_from_buffer(body).map_err(|e| Error::Snapshot(format!("loading index: {e}")))?;
        if graph.dimensions() != dim {
            return Err(Error::Snapshot(format!("index blob has dimension {}, header says {dim}", graph.dimensions())));
        }
        graph.change_expansion_search(header.params.ef_search);
        for &id in &header.ids {
            if id < 0 || id >= header.next_id || !graph.contains(id as u64) {
                return Err(Error::Snapshot(format!("header id {id} is not in the index blob")));
            }
            if !index.live.insert(id) {
                return Err(Error::Snapshot(format!("header lists id {id} twice")));
            }
        }
        index.graph = Some(graph);
        Ok(index)
    }
}

impl Default for VectorIndex {
    fn default() -> Self { Self::new(HnswParams::default()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(angle: f32) -> Vec<f32> { vec![angle.cos(), angle.sin()] }

    #[test]
    fn next_id_survives_removal() {
        let mut index = VectorIndex::new(HnswParams::default());
        index.add(&[0, 1, 2], &[unit(0.0), unit(0.5), unit(1.0)]).unwrap();
        assert_eq!(index.remove(&[2]), 1);
        assert_eq!(index.next_id(), 3);
        assert_eq!(index.ids(), vec![0, 1]);
    }

    #[test]
    fn bytes_restore_with_header() {
        let mut index = VectorIndex::new(HnswParams { m: 8, ef_construction: 32, ef_search: 8 });
        let ids: Vec<i64> = (0..30).collect();
        let vectors: Vec<Vec<f32>> = ids.iter().map(|&i| unit(i as f32 * 0.05)).collect();
        index.add(&ids, &vectors).unwrap();
        index.remove(&[4]);

        let restored = VectorIndex::from_bytes(index.header(), &index.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.ids(), index.ids());
        assert_eq!(restored.next_id(), 30);
        assert_eq!(restored.search(&unit(0.2), 3).unwrap(), index.search(&unit(0.2), 3).unwrap());
    }

    #[test]
    fn header_listing_unknown_id_is_rejected() {
        let mut index = VectorIndex::new(HnswParams::default());
        index.add(&[0], &[unit(0.0)]).unwrap();
        let bytes = index.to_bytes().unwrap();
        let mut unknown = index.header();
        unknown.ids.push(5);
        assert!(matches!(VectorIndex::from_bytes(unknown, &bytes), Err(Error::Snapshot(_))));
        let mut repeated = index.header();
        repeated.ids.push(0);
        assert!(matches!(VectorIndex::from_bytes(repeated, &bytes), Err(Error::Snapshot(_))));
    }

    #[test]
    fn empty_index_round_trips() {
        let index = VectorIndex::new(HnswParams::default());
        let restored = VectorIndex::from_bytes(index.header(), &index.to_bytes().unwrap()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.dimension(), None);
    }
}

//! On-disk snapshot: `index.hnsw`, `metadata.json` and `stats.json`, committed together.
//!
//! Each save writes a complete generation into a staging directory, renames it
//! to `gen-<n>` and then atomically replaces `manifest.json`, which names the
//! committed generation and carries the index header. Until the manifest is
//! replaced, loading keeps reading the previous generation. Loading checks that
//! every record resolves in the index and that counts agree.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use scrible_core::types::{ChunkRecord, Stats};
use scrible_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};

use crate::index::{HnswParams, IndexHeader, VectorIndex};
use crate::metadata::MetadataStore;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_FILE: &str = "index.hnsw";
pub const METADATA_FILE: &str = "metadata.json";
pub const STATS_FILE: &str = "stats.json";
pub const INDEX_TYPE: &str = "HNSW";

const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    generation: u64,
    committed_at: DateTime<Utc>,
    index: IndexHeader,
}

pub struct SnapshotPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
    pub stats: PathBuf,
}

impl SnapshotPaths {
    pub fn new(generation_dir: &Path) -> Self {
        Self {
            index: generation_dir.join(INDEX_FILE),
            metadata: generation_dir.join(METADATA_FILE),
            stats: generation_dir.join(STATS_FILE),
        }
    }
}

fn generation_dir(dir: &Path, generation: u64) -> PathBuf { dir.join(format!("{GENERATION_PREFIX}{generation:06}")) }

fn read_manifest(dir: &Path) -> Result<Option<Manifest>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let manifest = serde_json::from_slice(&fs::read(&path)?)
        .map_err(|e| Error::Snapshot(format!("unreadable {MANIFEST_FILE}: {e}")))?;
    Ok(Some(manifest))
}

/// Directory of the committed generation, if any.
pub fn committed_dir(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(read_manifest(dir)?.map(|m| generation_dir(dir, m.generation)))
}

pub fn stats_for(index: &VectorIndex, store: &MetadataStore) -> Stats {
    Stats {
        total_chunks: store.len(),
        total_documents: store.document_count(),
        embedding_dimension: index.dimension(),
        index_type: INDEX_TYPE.to_string(),
        last_updated: Utc::now(),
    }
}

/// One-to-one check between index entries and metadata records.
pub fn verify_parity(index: &VectorIndex, store: &MetadataStore) -> Result<()> {
    if index.len() != store.len() {
        return Err(Error::IndexInconsistency(format!(
            "index holds {} vectors but metadata holds {} records",
            index.len(),
            store.len()
        )));
    }
    if let Some(r) = store.all().iter().find(|r| !index.contains(r.embedding_id)) {
        return Err(Error::IndexInconsistency(format!(
            "record {} points at embedding id {} missing from the index",
            r.chunk_id, r.embedding_id
        )));
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Write a new generation and commit it. Older generations are removed afterwards.
pub fn save(dir: &Path, index: &VectorIndex, store: &MetadataStore) -> Result<Stats> {
    verify_parity(index, store)?;
    fs::create_dir_all(dir)?;
    let previous = read_manifest(dir)?;
    let generation = previous.as_ref().map_or(1, |m| m.generation + 1);
    let stats = stats_for(index, store);

    let staging = Builder::new().prefix(STAGING_PREFIX).tempdir_in(dir)?;
    let paths = SnapshotPaths::new(staging.path());
    write_synced(&paths.index, &index.to_bytes()?)?;
    write_synced(&paths.metadata, &serde_json::to_vec_pretty(store.all())?)?;
    write_synced(&paths.stats, &serde_json::to_vec_pretty(&stats)?)?;

    let target = generation_dir(dir, generation);
    if target.exists() {
        // Left behind by a save that never reached its manifest.
        fs::remove_dir_all(&target)?;
    }
    fs::rename(staging.path(), &target)?;

    let manifest = Manifest { generation, committed_at: stats.last_updated, index: index.header() };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&serde_json::to_vec_pretty(&manifest)?)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(MANIFEST_FILE)).map_err(|e| Error::Io(e.error))?;

    prune_generations(dir, generation);
    tracing::info!(dir = %dir.display(), generation, chunks = stats.total_chunks, documents = stats.total_documents, "snapshot saved");
    Ok(stats)
}

fn prune_generations(dir: &Path, keep: u64) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(generation) = name.strip_prefix(GENERATION_PREFIX).and_then(|g| g.parse::<u64>().ok()) else { continue };
        if generation < keep {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "could not remove old snapshot generation");
            }
        }
    }
}

/// Load the committed index/metadata pair. A directory without a manifest loads as empty.
pub fn load(dir: &Path, params: HnswParams) -> Result<(VectorIndex, MetadataStore)> {
    let Some(manifest) = read_manifest(dir)? else {
        tracing::info!(dir = %dir.display(), "no snapshot found, starting empty");
        return Ok((VectorIndex::new(params), MetadataStore::new()));
    };
    let paths = SnapshotPaths::new(&generation_dir(dir, manifest.generation));
    match (paths.index.exists(), paths.metadata.exists()) {
        (true, true) => {}
        (true, false) => return Err(Error::Snapshot(format!("{INDEX_FILE} exists without {METADATA_FILE}"))),
        (false, true) => return Err(Error::Snapshot(format!("{METADATA_FILE} exists without {INDEX_FILE}"))),
        (false, false) => return Err(Error::Snapshot(format!("generation {} is missing", manifest.generation))),
    }

    let mut index = VectorIndex::from_bytes(manifest.index, &fs::read(&paths.index)?)?;
    index.set_ef_search(params.ef_search);
    let records: Vec<ChunkRecord> = serde_json::from_slice(&fs::read(&paths.metadata)?)
        .map_err(|e| Error::Snapshot(format!("unreadable {METADATA_FILE}: {e}")))?;
    let store = MetadataStore::from_records(records).map_err(|e| Error::Snapshot(e.to_string()))?;
    verify_parity(&index, &store).map_err(|e| Error::Snapshot(e.to_string()))?;

    tracing::info!(dir = %dir.display(), generation = manifest.generation, chunks = store.len(), "snapshot loaded");
    Ok((index, store))
}

/// Stats of the committed generation, if there is one.
pub fn read_stats(dir: &Path) -> Result<Option<Stats>> {
    let Some(generation) = committed_dir(dir)? else { return Ok(None) };
    let path = SnapshotPaths::new(&generation).stats;
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&fs::read(path)?)?))
}

//! HNSW vector index (usearch), chunk metadata store and their paired on-disk snapshot.

pub mod index;
pub mod metadata;
pub mod snapshot;

pub use index::{HnswParams, IndexHeader, VectorIndex};
pub use metadata::MetadataStore;

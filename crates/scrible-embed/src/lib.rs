pub mod bert;
pub mod device;
pub mod hash;
pub mod pool;
pub mod tokenize;

pub use bert::BertEmbedder;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;

use std::path::Path;
use std::sync::Arc;

use scrible_core::config::{EmbeddingBackend, EmbeddingSettings};
use scrible_core::resolve_with_base;
use scrible_core::traits::Embedder;

/// Build the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing backend.
pub fn from_settings(settings: &EmbeddingSettings, base: &Path) -> anyhow::Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake || settings.backend == EmbeddingBackend::Hash {
        tracing::info!(dim = settings.hash_dim, "🧪 Using HashEmbedder");
        return Ok(Arc::new(HashEmbedder::new(settings.hash_dim)));
    }
    let dir = bert::resolve_model_dir(&resolve_with_base(base, &settings.model_dir))?;
    Ok(Arc::new(BertEmbedder::load(&dir, settings.max_len, settings.batch_size)?))
}

//! Collaborator boundaries. Implementations live in other crates or in the host.

use async_trait::async_trait;

use crate::types::{DocumentSource, Extracted};

/// Turns a document source into raw text plus provenance metadata.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, source: &DocumentSource) -> anyhow::Result<Extracted>;
}

/// Maps text to fixed-dimension, L2-normalized vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    /// Stable identifier of the model; snapshots built by different embedders are not comparable.
    fn embedder_id(&self) -> String;
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<String>;
}

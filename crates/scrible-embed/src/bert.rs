//! Local BERT-family sentence embedder (e.g. all-MiniLM-L6-v2) on candle.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use scrible_core::traits::Embedder;
use tokenizers::Tokenizer;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

struct Loaded {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

pub struct BertEmbedder {
    loaded: Arc<Loaded>,
    dim: usize,
    max_len: usize,
    batch_size: usize,
    model_name: String,
}

impl BertEmbedder {
    /// Load `tokenizer.json`, `config.json` and `model.safetensors` (or `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize, batch_size: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "🔄 Loading sentence model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let dim = config.hidden_size;
        let model_name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "bert".into());
        tracing::info!(model = %model_name, dim, "✅ Sentence model loaded");

        Ok(Self { loaded: Arc::new(Loaded { model, tokenizer, device }), dim, max_len, batch_size: batch_size.max(1), model_name })
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let weights = candle_core::pickle::read_all(&pickle)?;
        return weights
            .into_iter()
            .map(|(name, t)| -> Result<(String, Tensor)> { Ok((name, t.to_device(device)?)) })
            .collect();
    }
    Err(anyhow!("No model.safetensors or pytorch_model.bin under {}", model_dir.display()))
}

impl Loaded {
    fn embed_sync(&self, texts: &[String], max_len: usize, batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let inputs = tokenize_batch(&self.tokenizer, batch, max_len, &self.device)?;
            let hidden = self.model.forward(&inputs.input_ids, &inputs.token_type_ids, Some(&inputs.attention_mask))?;
            let pooled = masked_mean_l2(&hidden, &inputs.attention_mask)?;
            out.extend(pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?);
        }
        tracing::debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

#[async_trait]
impl Embedder for BertEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embedder_id(&self) -> String { format!("bert-{}-{}", self.model_name, self.dim) }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let loaded = Arc::clone(&self.loaded);
        let texts = texts.to_vec();
        let (max_len, batch_size) = (self.max_len, self.batch_size);
        tokio::task::spawn_blocking(move || loaded.embed_sync(&texts, max_len, batch_size)).await?
    }
}

/// Model directory resolution: `APP_MODEL_DIR`, then `MODEL_DIR`, then the configured path.
pub fn resolve_model_dir(configured: &Path) -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { tracing::info!("📦 Using {}: {}", var, p.display()); return Ok(p); }
        }
    }
    if configured.exists() { return Ok(configured.to_path_buf()); }
    Err(anyhow!("Could not locate model directory {}", configured.display()))
}

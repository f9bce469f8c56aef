//! Typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_CHUNKING__CHUNK_SIZE=256`). Provides helpers to expand `~` and `${VAR}`
//! and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub answer: AnswerSettings,
    pub timeouts: TimeoutSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub snapshot_dir: String,
    pub raw_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self { Self { snapshot_dir: "data/index".into(), raw_dir: "data/raw".into() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Trailing sentences of a closed chunk that seed the next one.
    pub overlap_sentences: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self { Self { chunk_size: 512, overlap_sentences: 1 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for IndexSettings {
    fn default() -> Self { Self { m: 32, ef_construction: 200, ef_search: 100 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local BERT-family sentence model (candle).
    Bert,
    /// Deterministic feature hashing; no model files needed.
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: String,
    pub max_len: usize,
    pub batch_size: usize,
    pub hash_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Bert,
            model_dir: "models/all-MiniLM-L6-v2".into(),
            max_len: 256,
            batch_size: 32,
            hash_dim: 384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_k: usize,
    pub answer_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { default_k: 10, answer_k: 5 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerSettings {
    pub max_context_chars: usize,
    pub excerpt_chars: usize,
    pub fallback_results: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self { max_context_chars: 6000, excerpt_chars: 200, fallback_results: 3, max_tokens: 500, temperature: 0.3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub embed_secs: u64,
    pub llm_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self { Self { embed_secs: 60, llm_secs: 60 } }
}

/// OpenAI-compatible endpoint. No `base_url` means no LLM; answers use the extractive fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key_env: String,
}

impl Default for LlmSettings {
    fn default() -> Self { Self { base_url: None, model: "gpt-4".into(), api_key_env: "OPENAI_API_KEY".into() } }
}

impl Settings {
    /// Load from the current directory using `RUST_ENV` (default `dev`).
    pub fn load() -> anyhow::Result<Self> { Self::load_from(Path::new(".")) }

    /// Load `config.toml` and `config.<env>.toml` found under `base`, then `APP_*` env vars.
    pub fn load_from(base: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let settings = Self::from_figment(&figment)?;
        tracing::debug!(env = %env_name, "settings loaded");
        Ok(settings)
    }

    /// Extract and validate settings from an already-assembled figment.
    pub fn from_figment(figment: &Figment) -> anyhow::Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        fn nonzero(value: usize, key: &str) -> Result<()> {
            if value == 0 { return Err(Error::InvalidConfig(format!("{key} must be greater than zero"))); }
            Ok(())
        }
        nonzero(self.chunking.chunk_size, "chunking.chunk_size")?;
        nonzero(self.index.ef_construction, "index.ef_construction")?;
        nonzero(self.index.ef_search, "index.ef_search")?;
        nonzero(self.embedding.max_len, "embedding.max_len")?;
        nonzero(self.embedding.batch_size, "embedding.batch_size")?;
        nonzero(self.embedding.hash_dim, "embedding.hash_dim")?;
        nonzero(self.retrieval.default_k, "retrieval.default_k")?;
        nonzero(self.retrieval.answer_k, "retrieval.answer_k")?;
        nonzero(self.answer.max_context_chars, "answer.max_context_chars")?;
        nonzero(self.answer.excerpt_chars, "answer.excerpt_chars")?;
        if self.index.m < 2 {
            return Err(Error::InvalidConfig(format!("index.m must be at least 2, got {}", self.index.m)));
        }
        if self.timeouts.embed_secs == 0 || self.timeouts.llm_secs == 0 {
            return Err(Error::InvalidConfig("timeouts must be greater than zero".into()));
        }
        if !self.answer.temperature.is_finite() || self.answer.temperature < 0.0 {
            return Err(Error::InvalidConfig(format!("answer.temperature must be a non-negative number, got {}", self.answer.temperature)));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

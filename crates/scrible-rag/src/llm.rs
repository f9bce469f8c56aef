//! OpenAI-compatible chat completions client.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use scrible_core::config::LlmSettings;
use scrible_core::traits::LlmClient;
use serde_json::{json, Value};

pub struct OpenAiCompatibleClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    /// `None` when no endpoint is configured. The API key is read from `api_key_env`, if set.
    pub fn from_settings(settings: &LlmSettings, timeout: Duration) -> anyhow::Result<Option<Self>> {
        let Some(base_url) = settings.base_url.as_deref() else { return Ok(None) };
        let api_key = std::env::var(&settings.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!("⚠️ {} is not set; calling {} without credentials", settings.api_key_env, base_url);
        }
        Ok(Some(Self::new(base_url, &settings.model, api_key, timeout)?))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32, temperature: f32) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).header("Content-Type", "application/json").json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp = req.send().await.with_context(|| format!("connection to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, text));
        }

        let json: Value = resp.json().await?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| anyhow!("No choices in response"))?;
        Ok(content.trim().to_string())
    }
}

//! Embedding provider abstraction and the Ollama-compatible HTTP
//! implementation.
//!
//! The contract: identical input text always produces an identical
//! vector, batches preserve input order, and an empty or malformed
//! embedding is a loud failure — never a silent zero vector, unless the
//! caller explicitly opted into the degraded fallback.
//!
//! # Retry Strategy
//!
//! Transient failures (HTTP 429, 5xx, network errors) are retried with
//! exponential backoff (1s, 2s, 4s, ... capped at 2^5). Other client
//! errors fail immediately.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Declared vector dimensionality. Must agree with what
    /// [`embed`](Embedder::embed) actually produces; the indexer treats
    /// a mismatch as a configuration error.
    fn dims(&self) -> usize;

    /// Maximum number of in-flight [`embed`](Embedder::embed) calls the
    /// default [`embed_batch`](Embedder::embed_batch) issues at once.
    fn batch_size(&self) -> usize {
        1
    }

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch, preserving input order in the output. The default
    /// processes the input in windows of [`batch_size`](Embedder::batch_size),
    /// joining the concurrent calls within each window; providers with a
    /// native batch endpoint can override.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let window_size = self.batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for window in texts.chunks(window_size) {
            let batch =
                futures::future::try_join_all(window.iter().map(|text| self.embed(text))).await?;
            vectors.extend(batch);
        }
        Ok(vectors)
    }

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<()>;
}

/// Embedding provider speaking the Ollama HTTP API
/// (`POST /api/embeddings` with `{model, prompt}`).
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    allow_degraded: bool,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    /// Build the provider from configuration. The HTTP client and its
    /// connection pool are created once here and shared across calls;
    /// the pool is released when the provider is dropped.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            // First call may trigger a model load on the provider side.
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            allow_degraded: config.allow_degraded,
            client,
        })
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .context("Invalid embedding response body")?;
                        return parse_embedding(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Embedding API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding array"))?;

    let mut vector = Vec::with_capacity(values.len());
    for v in values {
        let f = v
            .as_f64()
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: non-numeric value"))?;
        vector.push(f as f32);
    }
    Ok(vector)
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.request_embedding(text).await?;

        if vector.is_empty() {
            if self.allow_degraded {
                warn!(
                    model = %self.model,
                    "empty embedding returned; substituting degraded zero vector"
                );
                return Ok(vec![0.0; self.dims]);
            }
            bail!(
                "Model '{}' returned an empty embedding (set embedding.allow_degraded to tolerate)",
                self.model
            );
        }

        if vector.len() != self.dims {
            bail!(
                "Embedding dimensionality mismatch: model '{}' produced {} dims, {} configured",
                self.model,
                vector.len(),
                self.dims
            );
        }

        Ok(vector)
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Embedding provider unreachable")?;
        if !resp.status().is_success() {
            bail!("Embedding provider returned {}", resp.status());
        }
        Ok(())
    }
}

//! Qdrant-compatible HTTP implementation of [`SemanticBackend`].
//!
//! Speaks the collections/points REST API: collection bootstrap, point
//! upsert, vector search with payload filters, and delete-by-filter
//! keyed on the `parent_id` payload field.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::backend::{hit_from_payload, BackendHit, FilterMap, SemanticBackend};
use crate::config::SemanticBackendConfig;
use crate::models::Chunk;

pub struct QdrantBackend {
    base_url: String,
    api_key: Option<String>,
    collection: String,
    search_timeout: Duration,
    write_timeout: Duration,
    client: reqwest::Client,
}

impl QdrantBackend {
    pub fn new(config: &SemanticBackendConfig) -> Result<Self> {
        // Timeouts are applied per request: searches and writes get
        // different budgets from the same pooled client.
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build semantic backend HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
            search_timeout: Duration::from_secs(config.timeout_secs),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    fn point_payload(chunk: &Chunk) -> Value {
        json!({
            "content": chunk.content,
            "parent_id": chunk.parent_id,
            "chunk_index": chunk.chunk_index,
            "total_chunks": chunk.total_chunks,
            "source_ref": chunk.source_ref,
            "title": chunk.title,
            "doc_type": chunk.doc_type,
            "tags": chunk.tags,
            "metadata": chunk.metadata,
        })
    }
}

/// Translate the generic filter map into a Qdrant `must` filter clause.
///
/// Scalars become exact matches, arrays become `any` matches. Nested
/// objects have no counterpart in this translation and are rejected, so
/// the caller can skip this backend rather than query with a silently
/// dropped condition.
fn translate_filter(filters: &FilterMap) -> Result<Option<Value>> {
    if filters.is_empty() {
        return Ok(None);
    }

    let mut must = Vec::with_capacity(filters.len());
    for (key, value) in filters {
        let condition = match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                json!({ "key": key, "match": { "value": value } })
            }
            Value::Array(items) => json!({ "key": key, "match": { "any": items } }),
            other => bail!("Unsupported semantic filter value for '{}': {}", key, other),
        };
        must.push(condition);
    }
    Ok(Some(json!({ "must": must })))
}

#[async_trait]
impl SemanticBackend for QdrantBackend {
    async fn collection_dims(&self) -> Result<Option<usize>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/collections/{}", self.collection))
            .timeout(self.search_timeout)
            .send()
            .await
            .context("Semantic backend unreachable")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("Semantic backend returned {}", resp.status());
        }

        let body: Value = resp.json().await.context("Invalid collection info body")?;
        let size = body
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow::anyhow!("Collection info missing vector size"))?;
        Ok(Some(size as usize))
    }

    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        if self.collection_dims().await?.is_some() {
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": dims, "distance": "Cosine" }
        });
        let resp = self
            .request(reqwest::Method::PUT, &format!("/collections/{}", self.collection))
            .timeout(self.write_timeout)
            .json(&body)
            .send()
            .await
            .context("Failed to create collection")?;

        // A concurrent indexer may have won the create race; that is fine.
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Collection create failed ({}): {}", status, text);
        }
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = chunk
                .embedding
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Chunk {} has no embedding", chunk.id))?;
            points.push(json!({
                "id": chunk.id,
                "vector": vector,
                "payload": Self::point_payload(chunk),
            }));
        }

        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", self.collection),
            )
            .timeout(self.write_timeout)
            .json(&json!({ "points": points }))
            .send()
            .await
            .context("Semantic upsert request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Semantic upsert failed ({}): {}", status, text);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &FilterMap,
    ) -> Result<Vec<BackendHit>> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = translate_filter(filters)? {
            body["filter"] = filter;
        }

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .timeout(self.search_timeout)
            .json(&body)
            .send()
            .await
            .context("Semantic search request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Semantic search failed ({}): {}", status, text);
        }

        let body: Value = resp.json().await.context("Invalid search response body")?;
        let raw_hits = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("Search response missing result array"))?;

        let mut hits = Vec::with_capacity(raw_hits.len());
        for raw in raw_hits {
            let id = match raw.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            let score = raw.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let payload = raw
                .get("payload")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(Map::new);
            hits.push(hit_from_payload(id, score, payload));
        }
        Ok(hits)
    }

    async fn delete_by_parent(&self, parent_id: &str) -> Result<()> {
        let body = json!({
            "filter": {
                "must": [
                    { "key": "parent_id", "match": { "value": parent_id } }
                ]
            }
        });

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/delete?wait=true", self.collection),
            )
            .timeout(self.write_timeout)
            .json(&body)
            .send()
            .await
            .context("Semantic delete request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Semantic delete failed ({}): {}", status, text);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, "/collections")
            .timeout(self.search_timeout)
            .send()
            .await
            .context("Semantic backend unreachable")?;
        if !resp.status().is_success() {
            bail!("Semantic backend returned {}", resp.status());
        }
        Ok(())
    }
}

//! Meilisearch-compatible HTTP implementation of [`KeywordBackend`].
//!
//! Chunks are stored as flat documents in one index. Writes go through
//! the task queue (the API acknowledges with 202 before the write is
//! visible); deletion is resolved to concrete document ids via a
//! `parent_id` filter search, then submitted as an id batch.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Duration;

use crate::backend::{hit_from_payload, BackendHit, FilterMap, KeywordBackend};
use crate::config::KeywordBackendConfig;
use crate::models::Chunk;

/// Page size used when resolving chunk ids for deletion.
const DELETE_PAGE: usize = 1000;

pub struct MeiliBackend {
    base_url: String,
    api_key: Option<String>,
    index: String,
    search_timeout: Duration,
    write_timeout: Duration,
    searchable_attributes: Vec<String>,
    filterable_attributes: Vec<String>,
    client: reqwest::Client,
}

impl MeiliBackend {
    pub fn new(config: &KeywordBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build keyword backend HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            index: config.index.clone(),
            search_timeout: Duration::from_secs(config.timeout_secs),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
            searchable_attributes: config.searchable_attributes.clone(),
            filterable_attributes: config.filterable_attributes.clone(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn chunk_document(chunk: &Chunk) -> Value {
        json!({
            "id": chunk.id,
            "parent_id": chunk.parent_id,
            "content": chunk.content,
            "chunk_index": chunk.chunk_index,
            "total_chunks": chunk.total_chunks,
            "source_ref": chunk.source_ref,
            "title": chunk.title,
            "doc_type": chunk.doc_type,
            "tags": chunk.tags,
            "metadata": chunk.metadata,
        })
    }

    async fn search_raw(&self, body: Value) -> Result<Vec<Value>> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/indexes/{}/search", self.index),
            )
            .timeout(self.search_timeout)
            .json(&body)
            .send()
            .await
            .context("Keyword search request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Keyword search failed ({}): {}", status, text);
        }

        let body: Value = resp.json().await.context("Invalid search response body")?;
        Ok(body
            .get("hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// Ids from a resolve page that have not been submitted for deletion yet.
fn unsubmitted_ids(hits: &[Value], submitted: &HashSet<String>) -> Vec<String> {
    hits.iter()
        .filter_map(|h| h.get("id").and_then(Value::as_str))
        .filter(|id| !submitted.contains(*id))
        .map(str::to_string)
        .collect()
}

fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Translate the generic filter map into a Meilisearch filter expression.
///
/// Scalars become `key = value` clauses, arrays become OR groups; all
/// clauses are joined with AND. Nested objects are rejected so the
/// caller can skip this backend instead of querying with a dropped
/// condition.
fn translate_filter(filters: &FilterMap) -> Result<Option<String>> {
    if filters.is_empty() {
        return Ok(None);
    }

    fn scalar(key: &str, value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(format!("{} = '{}'", key, escape_filter_value(s))),
            Value::Number(n) => Ok(format!("{} = {}", key, n)),
            Value::Bool(b) => Ok(format!("{} = {}", key, b)),
            other => bail!("Unsupported keyword filter value for '{}': {}", key, other),
        }
    }

    let mut clauses = Vec::with_capacity(filters.len());
    for (key, value) in filters {
        match value {
            Value::Array(items) => {
                let alternatives = items
                    .iter()
                    .map(|item| scalar(key, item))
                    .collect::<Result<Vec<_>>>()?;
                if alternatives.is_empty() {
                    continue;
                }
                clauses.push(format!("({})", alternatives.join(" OR ")));
            }
            other => clauses.push(scalar(key, other)?),
        }
    }
    if clauses.is_empty() {
        return Ok(None);
    }
    Ok(Some(clauses.join(" AND ")))
}

#[async_trait]
impl KeywordBackend for MeiliBackend {
    async fn ensure_index(&self) -> Result<()> {
        let body = json!({ "uid": self.index, "primaryKey": "id" });
        let resp = self
            .request(reqwest::Method::POST, "/indexes")
            .timeout(self.write_timeout)
            .json(&body)
            .send()
            .await
            .context("Failed to create keyword index")?;

        // Index creation is enqueued; an already-existing index fails in
        // the task, not here, so both outcomes land on success statuses.
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Keyword index create failed ({}): {}", status, text);
        }

        let settings = json!({
            "searchableAttributes": self.searchable_attributes,
            "filterableAttributes": self.filterable_attributes,
        });
        let resp = self
            .request(
                reqwest::Method::PATCH,
                &format!("/indexes/{}/settings", self.index),
            )
            .timeout(self.write_timeout)
            .json(&settings)
            .send()
            .await
            .context("Failed to apply keyword index settings")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Keyword settings update failed ({}): {}", status, text);
        }
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let documents: Vec<Value> = chunks.iter().map(Self::chunk_document).collect();

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/indexes/{}/documents", self.index),
            )
            .timeout(self.write_timeout)
            .json(&documents)
            .send()
            .await
            .context("Keyword upsert request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Keyword upsert failed ({}): {}", status, text);
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        limit: usize,
        filters: &FilterMap,
    ) -> Result<Vec<BackendHit>> {
        let mut body = json!({
            "q": text,
            "limit": limit,
            "showRankingScore": true,
        });
        if let Some(expr) = translate_filter(filters)? {
            body["filter"] = json!(expr);
        }

        let raw_hits = self.search_raw(body).await?;

        let mut hits = Vec::with_capacity(raw_hits.len());
        for raw in raw_hits {
            let Some(obj) = raw.as_object() else { continue };
            let id = match obj.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            let score = obj
                .get("_rankingScore")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let mut payload: Map<String, Value> = obj.clone();
            payload.remove("_rankingScore");
            hits.push(hit_from_payload(id, score, payload));
        }
        Ok(hits)
    }

    async fn delete_by_parent(&self, parent_id: &str) -> Result<()> {
        // Chunk ids change between re-indexing runs, so deletion resolves
        // the current ids through the stable parent_id field first.
        let filter = format!("parent_id = '{}'", escape_filter_value(parent_id));
        let mut submitted: HashSet<String> = HashSet::new();

        loop {
            let body = json!({
                "q": "",
                "limit": DELETE_PAGE,
                "filter": filter,
                "attributesToRetrieve": ["id"],
            });
            let hits = self.search_raw(body).await?;

            // Deletion is queued behind the task API, so a follow-up
            // resolve can re-see ids whose delete task has not run yet.
            // Each id is submitted exactly once.
            let ids = unsubmitted_ids(&hits, &submitted);
            if ids.is_empty() {
                return Ok(());
            }

            let resp = self
                .request(
                    reqwest::Method::POST,
                    &format!("/indexes/{}/documents/delete-batch", self.index),
                )
                .timeout(self.write_timeout)
                .json(&ids)
                .send()
                .await
                .context("Keyword delete request failed")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                bail!("Keyword delete failed ({}): {}", status, text);
            }

            submitted.extend(ids);
            if hits.len() < DELETE_PAGE {
                return Ok(());
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, "/health")
            .timeout(self.search_timeout)
            .send()
            .await
            .context("Keyword backend unreachable")?;
        if !resp.status().is_success() {
            bail!("Keyword backend returned {}", resp.status());
        }
        Ok(())
    }
}

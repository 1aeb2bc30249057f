//! Search backend abstractions.
//!
//! The [`SemanticBackend`] and [`KeywordBackend`] traits define every
//! operation the indexer and the hybrid client need, enabling pluggable
//! implementations (HTTP backends, in-memory test doubles).
//!
//! Backends return loosely-typed JSON payloads with inconsistent key
//! names (`content` vs `text`, `source` vs `file`). Each implementation
//! normalizes its raw hits into [`BackendHit`] here, instead of
//! scattering alias lookups through the fusion logic.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::Chunk;

/// Generic caller-facing filter map, translated by each backend into its
/// native filter syntax.
pub type FilterMap = HashMap<String, Value>;

/// Payload keys tried, in priority order, when extracting hit content.
pub const CONTENT_KEYS: &[&str] = &["content", "text", "body"];

/// Payload keys tried, in priority order, when extracting the source
/// reference.
pub const SOURCE_KEYS: &[&str] = &["source_ref", "source", "file", "path"];

/// Payload keys tried, in priority order, when extracting the title.
pub const TITLE_KEYS: &[&str] = &["title", "name"];

/// A normalized hit from either backend, before fusion.
#[derive(Debug, Clone)]
pub struct BackendHit {
    pub id: String,
    /// Native score: cosine similarity for the semantic backend, ranking
    /// score for the keyword backend. Higher is better for both.
    pub score: f64,
    pub content: String,
    pub source_ref: Option<String>,
    pub title: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Look up the first present string value among `keys`, in order.
pub(crate) fn payload_str(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Build a [`BackendHit`] from a raw JSON payload, applying the alias
/// priority order for content, source, and title.
pub(crate) fn hit_from_payload(id: String, score: f64, payload: Map<String, Value>) -> BackendHit {
    BackendHit {
        id,
        score,
        content: payload_str(&payload, CONTENT_KEYS).unwrap_or_default(),
        source_ref: payload_str(&payload, SOURCE_KEYS),
        title: payload_str(&payload, TITLE_KEYS),
        metadata: payload,
    }
}

/// Vector similarity backend.
#[async_trait]
pub trait SemanticBackend: Send + Sync {
    /// Dimensionality of the existing collection, `None` when it does
    /// not exist yet. Used to detect embedder/collection mismatches
    /// before anything is written.
    async fn collection_dims(&self) -> Result<Option<usize>>;

    /// Create the collection with the given dimensionality if missing.
    /// Concurrent duplicate creation attempts are tolerated.
    async fn ensure_collection(&self, dims: usize) -> Result<()>;

    /// Upsert embedded chunks. Chunks without an embedding are an error.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Query by vector, returning up to `limit` normalized hits ordered
    /// by similarity descending.
    async fn query(&self, vector: &[f32], limit: usize, filters: &FilterMap)
        -> Result<Vec<BackendHit>>;

    /// Remove every chunk whose `parent_id` payload field matches.
    async fn delete_by_parent(&self, parent_id: &str) -> Result<()>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<()>;
}

/// Keyword (BM25-style) backend.
#[async_trait]
pub trait KeywordBackend: Send + Sync {
    /// Create the index and apply searchable/filterable attribute
    /// settings if missing. Idempotent.
    async fn ensure_index(&self) -> Result<()>;

    /// Upsert chunks as flat keyword documents.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Query by text, returning up to `limit` normalized hits ordered by
    /// relevance descending.
    async fn query(&self, text: &str, limit: usize, filters: &FilterMap)
        -> Result<Vec<BackendHit>>;

    /// Remove every chunk whose `parent_id` field matches.
    async fn delete_by_parent(&self, parent_id: &str) -> Result<()>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_content_alias_priority() {
        // "content" wins over "text" when both are present.
        let p = payload(&[("content", json!("a")), ("text", json!("b"))]);
        assert_eq!(payload_str(&p, CONTENT_KEYS).as_deref(), Some("a"));

        let p = payload(&[("text", json!("b"))]);
        assert_eq!(payload_str(&p, CONTENT_KEYS).as_deref(), Some("b"));
    }

    #[test]
    fn test_source_alias_priority() {
        let p = payload(&[("file", json!("f.md")), ("source", json!("s.md"))]);
        assert_eq!(payload_str(&p, SOURCE_KEYS).as_deref(), Some("s.md"));
    }

    #[test]
    fn test_missing_keys_yield_none() {
        let p = payload(&[("unrelated", json!(1))]);
        assert!(payload_str(&p, CONTENT_KEYS).is_none());
    }

    #[test]
    fn test_hit_from_payload_keeps_metadata() {
        let p = payload(&[("text", json!("body")), ("doc_type", json!("note"))]);
        let hit = hit_from_payload("x".to_string(), 0.5, p);
        assert_eq!(hit.content, "body");
        assert_eq!(hit.metadata.get("doc_type"), Some(&json!("note")));
    }
}

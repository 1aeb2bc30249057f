//! In-memory backend and embedder implementations.
//!
//! Used by the test suite and for offline development: the semantic
//! backend does brute-force cosine similarity, the keyword backend does
//! naive term-overlap scoring, and [`HashEmbedder`] produces
//! deterministic bag-of-words vectors with no model behind them.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::backend::{BackendHit, FilterMap, KeywordBackend, SemanticBackend};
use crate::embedding::Embedder;
use crate::models::Chunk;

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    dot / denom
}

fn chunk_matches_filters(chunk: &Chunk, filters: &FilterMap) -> bool {
    filters.iter().all(|(key, expected)| match key.as_str() {
        "parent_id" => expected.as_str() == Some(chunk.parent_id.as_str()),
        "doc_type" => expected.as_str() == chunk.doc_type.as_deref(),
        "source_ref" => expected.as_str() == Some(chunk.source_ref.as_str()),
        "tags" => match expected {
            Value::String(tag) => chunk.tags.iter().any(|t| t == tag),
            Value::Array(any) => any
                .iter()
                .filter_map(Value::as_str)
                .any(|tag| chunk.tags.iter().any(|t| t == tag)),
            _ => false,
        },
        _ => chunk.metadata.get(key) == Some(expected),
    })
}

fn hit_from_chunk(chunk: &Chunk, score: f64) -> BackendHit {
    BackendHit {
        id: chunk.id.clone(),
        score,
        content: chunk.content.clone(),
        source_ref: Some(chunk.source_ref.clone()),
        title: chunk.title.clone(),
        metadata: chunk.metadata.clone(),
    }
}

// ============ Semantic backend ============

#[derive(Default)]
struct SemanticState {
    dims: Option<usize>,
    chunks: HashMap<String, Chunk>,
}

/// Brute-force cosine-similarity [`SemanticBackend`].
#[derive(Default)]
pub struct MemorySemanticBackend {
    state: RwLock<SemanticState>,
}

impl MemorySemanticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks, for test assertions.
    pub async fn len(&self) -> usize {
        self.state.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SemanticBackend for MemorySemanticBackend {
    async fn collection_dims(&self) -> Result<Option<usize>> {
        Ok(self.state.read().await.dims)
    }

    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let mut state = self.state.write().await;
        if state.dims.is_none() {
            state.dims = Some(dims);
        }
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut state = self.state.write().await;
        for chunk in chunks {
            if chunk.embedding.is_none() {
                bail!("Chunk {} has no embedding", chunk.id);
            }
            state.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &FilterMap,
    ) -> Result<Vec<BackendHit>> {
        let state = self.state.read().await;
        let mut hits: Vec<BackendHit> = state
            .chunks
            .values()
            .filter(|c| chunk_matches_filters(c, filters))
            .filter_map(|c| {
                c.embedding
                    .as_ref()
                    .map(|e| hit_from_chunk(c, cosine_similarity(vector, e)))
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_parent(&self, parent_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.chunks.retain(|_, c| c.parent_id != parent_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============ Keyword backend ============

/// Naive term-overlap [`KeywordBackend`]: the score is the fraction of
/// query terms present in the chunk content.
#[derive(Default)]
pub struct MemoryKeywordBackend {
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl MemoryKeywordBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeywordBackend for MemoryKeywordBackend {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().await;
        for chunk in chunks {
            stored.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        limit: usize,
        filters: &FilterMap,
    ) -> Result<Vec<BackendHit>> {
        let terms: Vec<String> = text
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.chunks.read().await;
        let mut hits: Vec<BackendHit> = stored
            .values()
            .filter(|c| chunk_matches_filters(c, filters))
            .filter_map(|c| {
                let content = c.content.to_lowercase();
                let matched = terms.iter().filter(|t| content.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                Some(hit_from_chunk(c, matched as f64 / terms.len() as f64))
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_parent(&self, parent_id: &str) -> Result<()> {
        let mut stored = self.chunks.write().await;
        stored.retain(|_, c| c.parent_id != parent_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============ Embedder ============

/// Deterministic bag-of-words embedder.
///
/// Each word is hashed into one of `dims` buckets; the vector counts
/// bucket occupancy. Identical text always embeds identically, and
/// overlapping text yields a higher cosine similarity, which is all the
/// pipeline needs under test.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

fn word_bucket(word: &str, dims: usize) -> usize {
    // FNV-1a, stable across platforms and runs.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % dims as u64) as usize
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bag-of-words"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text.to_lowercase().split_whitespace() {
            vector[word_bucket(word, self.dims)] += 1.0;
        }
        Ok(vector)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("the quick brown fox").await.unwrap();
        let b = embedder.embed("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_hash_embedder_batch_preserves_order() {
        let embedder = HashEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}

//! End-to-end pipeline tests over in-memory backends.
//!
//! The HTTP implementations are thin transport adapters; everything
//! above the backend traits (chunking, embedding flow, dual writes,
//! fusion, degradation) is exercised here without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map};

use lattice_search::backend::{BackendHit, FilterMap, KeywordBackend, SemanticBackend};
use lattice_search::config::Config;
use lattice_search::embedding::Embedder;
use lattice_search::engine::Engine;
use lattice_search::memory::{HashEmbedder, MemoryKeywordBackend, MemorySemanticBackend};
use lattice_search::models::{Chunk, Document, Provenance};
use lattice_search::search::{HybridClient, SearchOptions};

const DIMS: usize = 64;

fn test_config() -> Config {
    let mut config = Config::default();
    config.chunking.chunk_size = 100;
    config.chunking.chunk_overlap = 0;
    config.embedding.dims = DIMS;
    config
}

struct Stack {
    engine: Engine,
    semantic: Arc<MemorySemanticBackend>,
    keyword: Arc<MemoryKeywordBackend>,
}

fn memory_stack() -> Stack {
    let config = test_config();
    let semantic = Arc::new(MemorySemanticBackend::new());
    let keyword = Arc::new(MemoryKeywordBackend::new());
    let engine = Engine::from_parts(
        &config,
        Arc::new(HashEmbedder::new(DIMS)),
        semantic.clone(),
        keyword.clone(),
    );
    Stack {
        engine,
        semantic,
        keyword,
    }
}

// ============ Failing / scripted doubles ============

struct FailingSemanticBackend;

#[async_trait]
impl SemanticBackend for FailingSemanticBackend {
    async fn collection_dims(&self) -> Result<Option<usize>> {
        bail!("semantic backend down")
    }
    async fn ensure_collection(&self, _dims: usize) -> Result<()> {
        bail!("semantic backend down")
    }
    async fn upsert_chunks(&self, _chunks: &[Chunk]) -> Result<()> {
        bail!("semantic backend down")
    }
    async fn query(&self, _v: &[f32], _l: usize, _f: &FilterMap) -> Result<Vec<BackendHit>> {
        bail!("semantic backend down")
    }
    async fn delete_by_parent(&self, _parent_id: &str) -> Result<()> {
        bail!("semantic backend down")
    }
    async fn ping(&self) -> Result<()> {
        bail!("semantic backend down")
    }
}

struct FailingKeywordBackend;

#[async_trait]
impl KeywordBackend for FailingKeywordBackend {
    async fn ensure_index(&self) -> Result<()> {
        bail!("keyword backend down")
    }
    async fn upsert_chunks(&self, _chunks: &[Chunk]) -> Result<()> {
        bail!("keyword backend down")
    }
    async fn query(&self, _t: &str, _l: usize, _f: &FilterMap) -> Result<Vec<BackendHit>> {
        bail!("keyword backend down")
    }
    async fn delete_by_parent(&self, _parent_id: &str) -> Result<()> {
        bail!("keyword backend down")
    }
    async fn ping(&self) -> Result<()> {
        bail!("keyword backend down")
    }
}

fn scripted_hit(id: &str, score: f64, content: &str) -> BackendHit {
    BackendHit {
        id: id.to_string(),
        score,
        content: content.to_string(),
        source_ref: None,
        title: None,
        metadata: Map::new(),
    }
}

/// Returns a fixed hit list and counts queries, so tests can assert that
/// invalid input never reaches a backend.
struct ScriptedSemanticBackend {
    hits: Vec<BackendHit>,
    queries: AtomicUsize,
}

impl ScriptedSemanticBackend {
    fn new(hits: Vec<BackendHit>) -> Self {
        Self {
            hits,
            queries: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SemanticBackend for ScriptedSemanticBackend {
    async fn collection_dims(&self) -> Result<Option<usize>> {
        Ok(Some(DIMS))
    }
    async fn ensure_collection(&self, _dims: usize) -> Result<()> {
        Ok(())
    }
    async fn upsert_chunks(&self, _chunks: &[Chunk]) -> Result<()> {
        Ok(())
    }
    async fn query(&self, _v: &[f32], _l: usize, _f: &FilterMap) -> Result<Vec<BackendHit>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.clone())
    }
    async fn delete_by_parent(&self, _parent_id: &str) -> Result<()> {
        Ok(())
    }
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct ScriptedKeywordBackend {
    hits: Vec<BackendHit>,
    queries: AtomicUsize,
}

impl ScriptedKeywordBackend {
    fn new(hits: Vec<BackendHit>) -> Self {
        Self {
            hits,
            queries: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl KeywordBackend for ScriptedKeywordBackend {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }
    async fn upsert_chunks(&self, _chunks: &[Chunk]) -> Result<()> {
        Ok(())
    }
    async fn query(&self, _t: &str, _l: usize, _f: &FilterMap) -> Result<Vec<BackendHit>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.clone())
    }
    async fn delete_by_parent(&self, _parent_id: &str) -> Result<()> {
        Ok(())
    }
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("embedding provider down")
    }
    async fn ping(&self) -> Result<()> {
        bail!("embedding provider down")
    }
}

// ============ Indexing ============

#[tokio::test]
async fn test_index_short_document_single_chunk() {
    let stack = memory_stack();
    let doc = Document::new("test://abc", "A. B. C.");

    let report = stack.engine.indexer.index_document(&doc).await.unwrap();

    assert!(report.fully_indexed());
    assert_eq!(report.chunk_count, 1);
    assert_eq!(stack.semantic.len().await, 1);
    assert_eq!(stack.keyword.len().await, 1);
}

#[tokio::test]
async fn test_reindex_same_source_overwrites() {
    let stack = memory_stack();
    let doc = Document::new("test://same", "Stable content. More of it.");

    let first = stack.engine.indexer.index_document(&doc).await.unwrap();
    let second = stack.engine.indexer.index_document(&doc).await.unwrap();

    assert_eq!(first.document_id, second.document_id);
    // Same id, same chunk ids: the second run overwrites, no duplicates.
    assert_eq!(stack.semantic.len().await, first.chunk_count);
    assert_eq!(stack.keyword.len().await, first.chunk_count);
}

#[tokio::test]
async fn test_partial_write_reported_not_escalated() {
    let config = test_config();
    let semantic = Arc::new(MemorySemanticBackend::new());
    let engine = Engine::from_parts(
        &config,
        Arc::new(HashEmbedder::new(DIMS)),
        semantic.clone(),
        Arc::new(FailingKeywordBackend),
    );

    let doc = Document::new("test://partial", "Some content here.");
    let report = engine.indexer.index_document(&doc).await.unwrap();

    assert!(report.semantic.is_ok());
    assert!(!report.keyword.is_ok());
    assert!(!report.fully_indexed());
    // The healthy backend still received the write.
    assert_eq!(semantic.len().await, 1);
}

#[tokio::test]
async fn test_embedding_failure_aborts_indexing() {
    let config = test_config();
    let semantic = Arc::new(MemorySemanticBackend::new());
    let keyword = Arc::new(MemoryKeywordBackend::new());
    let engine = Engine::from_parts(
        &config,
        Arc::new(FailingEmbedder),
        semantic.clone(),
        keyword.clone(),
    );

    let doc = Document::new("test://embedfail", "Content.");
    assert!(engine.indexer.index_document(&doc).await.is_err());
    // Nothing was written anywhere.
    assert!(semantic.is_empty().await);
    assert!(keyword.is_empty().await);
}

#[tokio::test]
async fn test_delete_removes_chunks_from_both_backends() {
    let stack = memory_stack();
    let keep = Document::new("test://keep", "Kept content.");
    let drop = Document::new("test://drop", "Dropped content.");

    stack.engine.indexer.index_document(&keep).await.unwrap();
    stack.engine.indexer.index_document(&drop).await.unwrap();
    assert_eq!(stack.semantic.len().await, 2);

    let report = stack.engine.indexer.delete_document(&drop.id).await;
    assert!(report.semantic.is_ok());
    assert!(report.keyword.is_ok());
    assert_eq!(stack.semantic.len().await, 1);
    assert_eq!(stack.keyword.len().await, 1);
}

// ============ Hybrid search ============

#[tokio::test]
async fn test_hybrid_search_end_to_end() {
    let stack = memory_stack();
    let rust_doc = Document::new("test://rust", "Rust ownership and borrowing explained.");
    let python_doc = Document::new("test://python", "Python decorators and generators covered.");

    stack.engine.indexer.index_document(&rust_doc).await.unwrap();
    stack
        .engine
        .indexer
        .index_document(&python_doc)
        .await
        .unwrap();

    let results = stack
        .engine
        .client
        .search("Rust ownership", &SearchOptions::default())
        .await
        .unwrap();

    assert!(!results.is_empty());
    // The matching chunk surfaces from both backends, so it fuses to hybrid.
    assert_eq!(results[0].provenance, Provenance::Hybrid);
    assert_eq!(results[0].source_ref.as_deref(), Some("test://rust"));
    assert!(results[0].semantic_score.is_some());
    assert!(results[0].keyword_score.is_some());
}

#[tokio::test]
async fn test_hybrid_search_respects_filters() {
    let stack = memory_stack();
    let mut note = Document::new("test://note", "Shared phrase appears here.");
    note.doc_type = Some("note".to_string());
    let mut wiki = Document::new("test://wiki", "Shared phrase appears here too.");
    wiki.doc_type = Some("wiki".to_string());

    stack.engine.indexer.index_document(&note).await.unwrap();
    stack.engine.indexer.index_document(&wiki).await.unwrap();

    let mut filters = FilterMap::new();
    filters.insert("doc_type".to_string(), json!("note"));
    let opts = SearchOptions {
        filters,
        ..Default::default()
    };
    let results = stack.engine.client.search("shared phrase", &opts).await.unwrap();

    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.source_ref.as_deref(), Some("test://note"));
    }
}

#[tokio::test]
async fn test_semantic_outage_degrades_to_keyword_only() {
    let config = test_config();
    let keyword = Arc::new(MemoryKeywordBackend::new());
    let healthy = Engine::from_parts(
        &config,
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(MemorySemanticBackend::new()),
        keyword.clone(),
    );
    let doc = Document::new("test://degraded", "Deployment runbook for the cluster.");
    healthy.indexer.index_document(&doc).await.unwrap();

    // Same keyword store, but the semantic backend now fails every call.
    let degraded = Engine::from_parts(
        &config,
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(FailingSemanticBackend),
        keyword,
    );
    let results = degraded
        .client
        .search("deployment runbook", &SearchOptions::default())
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].provenance, Provenance::Keyword);
    assert!(results[0].semantic_score.is_none());
}

#[tokio::test]
async fn test_scripted_fusion_combined_score() {
    // Mock backends return one hit each with identical content:
    // combined = 0.9 * 0.6 + 0.8 * 0.4 = 0.86.
    let config = test_config();
    let client = HybridClient::new(
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(ScriptedSemanticBackend::new(vec![scripted_hit(
            "1", 0.9, "A. B. C.",
        )])),
        Arc::new(ScriptedKeywordBackend::new(vec![scripted_hit(
            "x", 0.8, "A. B. C.",
        )])),
        config.search.clone(),
    );

    let opts = SearchOptions {
        semantic_weight: Some(0.6),
        keyword_weight: Some(0.4),
        ..Default::default()
    };
    let results = client.search("abc", &opts).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provenance, Provenance::Hybrid);
    assert!((results[0].combined_score - 0.86).abs() < 1e-9);
}

#[tokio::test]
async fn test_zero_weights_rejected_before_any_backend_call() {
    let config = test_config();
    let semantic = Arc::new(ScriptedSemanticBackend::new(vec![]));
    let keyword = Arc::new(ScriptedKeywordBackend::new(vec![]));
    let client = HybridClient::new(
        Arc::new(HashEmbedder::new(DIMS)),
        semantic.clone(),
        keyword.clone(),
        config.search.clone(),
    );

    let opts = SearchOptions {
        semantic_weight: Some(0.0),
        keyword_weight: Some(0.0),
        ..Default::default()
    };
    assert!(client.search("anything", &opts).await.is_err());
    assert_eq!(semantic.queries.load(Ordering::SeqCst), 0);
    assert_eq!(keyword.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_min_score_boundary_is_inclusive() {
    let config = test_config();
    let client = HybridClient::new(
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(ScriptedSemanticBackend::new(vec![
            scripted_hit("1", 0.9, "strong hit"),
            scripted_hit("2", 0.5, "weak hit"),
        ])),
        Arc::new(ScriptedKeywordBackend::new(vec![])),
        config.search.clone(),
    );

    // With weights 1.0/0.0, combined scores are exactly 0.9 and 0.5.
    let base = SearchOptions {
        semantic_weight: Some(1.0),
        keyword_weight: Some(0.0),
        ..Default::default()
    };

    let at_floor = SearchOptions {
        min_score: Some(0.5),
        ..base.clone()
    };
    let results = client.search("q", &at_floor).await.unwrap();
    assert_eq!(results.len(), 2, "result at exactly min_score must be kept");

    let above_floor = SearchOptions {
        min_score: Some(0.5 + 1e-9),
        ..base
    };
    let results = client.search("q", &above_floor).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "strong hit");
}

// ============ Single-mode variants ============

#[tokio::test]
async fn test_single_mode_uses_native_scores() {
    let config = test_config();
    let client = HybridClient::new(
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(ScriptedSemanticBackend::new(vec![scripted_hit(
            "1", 0.77, "semantic content",
        )])),
        Arc::new(ScriptedKeywordBackend::new(vec![scripted_hit(
            "x", 0.55, "keyword content",
        )])),
        config.search.clone(),
    );

    let semantic = client
        .semantic_search("q", None, &FilterMap::new())
        .await
        .unwrap();
    assert_eq!(semantic.len(), 1);
    assert_eq!(semantic[0].provenance, Provenance::Semantic);
    // No weighting applied in single mode.
    assert!((semantic[0].combined_score - 0.77).abs() < 1e-9);

    let keyword = client
        .keyword_search("q", None, &FilterMap::new())
        .await
        .unwrap();
    assert_eq!(keyword[0].provenance, Provenance::Keyword);
    assert!((keyword[0].combined_score - 0.55).abs() < 1e-9);
}

#[tokio::test]
async fn test_single_mode_propagates_backend_failure() {
    // Unlike hybrid mode, single-mode has nothing to degrade to.
    let config = test_config();
    let client = HybridClient::new(
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(FailingSemanticBackend),
        Arc::new(MemoryKeywordBackend::new()),
        config.search.clone(),
    );
    assert!(client
        .semantic_search("q", None, &FilterMap::new())
        .await
        .is_err());
}

// ============ Status ============

#[tokio::test]
async fn test_status_reports_each_component() {
    let config = test_config();
    let client = HybridClient::new(
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(FailingSemanticBackend),
        Arc::new(MemoryKeywordBackend::new()),
        config.search.clone(),
    );

    let statuses = client.status().await;
    assert_eq!(statuses.len(), 3);
    let semantic = statuses.iter().find(|s| s.component == "semantic-backend").unwrap();
    assert!(!semantic.ok);
    let keyword = statuses.iter().find(|s| s.component == "keyword-backend").unwrap();
    assert!(keyword.ok);
    // The embedding entry names the model behind the probe.
    let embedding = statuses
        .iter()
        .find(|s| s.component == "embedding-provider")
        .unwrap();
    assert_eq!(embedding.detail.as_deref(), Some("hash-bag-of-words"));
}

//! Component wiring.
//!
//! [`Engine`] builds the HTTP-backed embedder and backends from a
//! [`Config`] and hands them, shared, to the indexer and the hybrid
//! client. Defaults are resolved here, at construction, and nowhere
//! else.

use anyhow::Result;
use std::sync::Arc;

use crate::backend::{KeywordBackend, SemanticBackend};
use crate::config::Config;
use crate::embedding::{Embedder, OllamaEmbedder};
use crate::indexer::DocumentIndexer;
use crate::meili::MeiliBackend;
use crate::qdrant::QdrantBackend;
use crate::search::HybridClient;

pub struct Engine {
    pub indexer: DocumentIndexer,
    pub client: HybridClient,
}

impl Engine {
    /// Wire up the default stack: Ollama-compatible embedder, Qdrant
    /// semantic backend, Meilisearch keyword backend.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let semantic: Arc<dyn SemanticBackend> = Arc::new(QdrantBackend::new(&config.semantic)?);
        let keyword: Arc<dyn KeywordBackend> = Arc::new(MeiliBackend::new(&config.keyword)?);
        Ok(Self::from_parts(config, embedder, semantic, keyword))
    }

    /// Wire up custom implementations (in-memory doubles, alternative
    /// backends) behind the same indexer and client.
    pub fn from_parts(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        semantic: Arc<dyn SemanticBackend>,
        keyword: Arc<dyn KeywordBackend>,
    ) -> Self {
        let indexer = DocumentIndexer::new(
            embedder.clone(),
            semantic.clone(),
            keyword.clone(),
            config.chunking.clone(),
        );
        let client = HybridClient::new(embedder, semantic, keyword, config.search.clone());
        Self { indexer, client }
    }
}

//! Synchronous convenience wrapper.
//!
//! The crate has one concurrency model: the async core. This wrapper is
//! the single blocking adapter at the outermost public boundary; it owns
//! a runtime and runs each async call to completion. No business logic
//! lives here.

use anyhow::{Context, Result};

use crate::backend::FilterMap;
use crate::config::Config;
use crate::engine::Engine;
use crate::models::{DeleteReport, Document, IndexReport, SearchResult};
use crate::search::{ComponentStatus, SearchOptions};

pub struct BlockingEngine {
    runtime: tokio::runtime::Runtime,
    engine: Engine,
}

impl BlockingEngine {
    pub fn from_config(config: &Config) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build blocking runtime")?;
        let engine = Engine::from_config(config)?;
        Ok(Self { runtime, engine })
    }

    pub fn index_document(&self, doc: &Document) -> Result<IndexReport> {
        self.runtime.block_on(self.engine.indexer.index_document(doc))
    }

    pub fn delete_document(&self, document_id: &str) -> DeleteReport {
        self.runtime
            .block_on(self.engine.indexer.delete_document(document_id))
    }

    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.runtime.block_on(self.engine.client.search(query, opts))
    }

    pub fn semantic_search(
        &self,
        query: &str,
        limit: Option<usize>,
        filters: &FilterMap,
    ) -> Result<Vec<SearchResult>> {
        self.runtime
            .block_on(self.engine.client.semantic_search(query, limit, filters))
    }

    pub fn keyword_search(
        &self,
        query: &str,
        limit: Option<usize>,
        filters: &FilterMap,
    ) -> Result<Vec<SearchResult>> {
        self.runtime
            .block_on(self.engine.client.keyword_search(query, limit, filters))
    }

    pub fn status(&self) -> Vec<ComponentStatus> {
        self.runtime.block_on(self.engine.client.status())
    }
}

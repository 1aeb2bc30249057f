//! Document indexing pipeline: chunk, embed, write to both backends.
//!
//! The two backend writes run concurrently and are reported
//! independently — partial success is a valid outcome, left to the
//! caller to retry. Embedding failures, by contrast, abort the whole
//! call: a missing vector would silently corrupt ranking.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{KeywordBackend, SemanticBackend};
use crate::chunk::chunk_document;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::models::{DeleteReport, Document, IndexReport, WriteOutcome};

pub struct DocumentIndexer {
    embedder: Arc<dyn Embedder>,
    semantic: Arc<dyn SemanticBackend>,
    keyword: Arc<dyn KeywordBackend>,
    chunking: ChunkingConfig,
}

impl DocumentIndexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        semantic: Arc<dyn SemanticBackend>,
        keyword: Arc<dyn KeywordBackend>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            semantic,
            keyword,
            chunking,
        }
    }

    /// Index one document: split into chunks, embed them in order, then
    /// write to both backends concurrently.
    ///
    /// Errors returned here are either embedding failures or an
    /// embedder/collection dimensionality mismatch; backend write
    /// failures are reported in the [`IndexReport`] instead.
    pub async fn index_document(&self, doc: &Document) -> Result<IndexReport> {
        let mut chunks =
            chunk_document(doc, self.chunking.chunk_size, self.chunking.chunk_overlap);

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let dims = self.embedder.dims();
        for vector in &vectors {
            if vector.len() != dims {
                bail!(
                    "Embedder produced {} dims but declares {}; check embedding.model/dims",
                    vector.len(),
                    dims
                );
            }
        }
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }

        // A collection that exists with a different dimensionality is a
        // configuration error, caught before anything is written. An
        // unreachable backend is not: it degrades to a partial write.
        if let Ok(Some(existing)) = self.semantic.collection_dims().await {
            if existing != dims {
                bail!(
                    "Collection has {} dims but embedder produces {}; refusing to mix vectors",
                    existing,
                    dims
                );
            }
        }

        let semantic_write = async {
            self.semantic.ensure_collection(dims).await?;
            self.semantic.upsert_chunks(&chunks).await
        };
        let keyword_write = async {
            self.keyword.ensure_index().await?;
            self.keyword.upsert_chunks(&chunks).await
        };
        let (semantic_result, keyword_result) = tokio::join!(semantic_write, keyword_write);

        if let Err(e) = &semantic_result {
            warn!(document = %doc.id, error = %format!("{e:#}"), "semantic write failed");
        }
        if let Err(e) = &keyword_result {
            warn!(document = %doc.id, error = %format!("{e:#}"), "keyword write failed");
        }

        let report = IndexReport {
            document_id: doc.id.clone(),
            chunk_count: chunks.len(),
            semantic: WriteOutcome::from_result(semantic_result),
            keyword: WriteOutcome::from_result(keyword_result),
        };
        if report.fully_indexed() {
            info!(document = %doc.id, chunks = report.chunk_count, "document indexed");
        }
        Ok(report)
    }

    /// Remove every chunk of a document from both backends, addressed by
    /// the stable `parent_id` field. Chunk ids are never used here: they
    /// can change between re-indexing runs.
    pub async fn delete_document(&self, document_id: &str) -> DeleteReport {
        let (semantic_result, keyword_result) = tokio::join!(
            self.semantic.delete_by_parent(document_id),
            self.keyword.delete_by_parent(document_id)
        );

        if let Err(e) = &semantic_result {
            warn!(document = %document_id, error = %format!("{e:#}"), "semantic delete failed");
        }
        if let Err(e) = &keyword_result {
            warn!(document = %document_id, error = %format!("{e:#}"), "keyword delete failed");
        }

        DeleteReport {
            document_id: document_id.to_string(),
            semantic: WriteOutcome::from_result(semantic_result),
            keyword: WriteOutcome::from_result(keyword_result),
        }
    }
}

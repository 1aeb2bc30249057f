//! Core data models for the indexing and retrieval pipeline.
//!
//! [`Document`]s are created by the caller and handed to the indexer.
//! [`Chunk`]s exist only inside a single indexing call; callers never
//! address them directly. [`SearchResult`]s are created fresh on every
//! query and are never persisted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Derive the stable document id for a source reference.
///
/// Uses a name-based (v5) UUID so re-indexing the same source always
/// produces the same id — an overwrite, never a duplicate.
pub fn document_id(source_ref: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, source_ref.as_bytes()).to_string()
}

/// Derive the id of a chunk from its parent document id and ordinal index.
///
/// Chunk ids are only stable for a given split; deletion is always keyed
/// on `parent_id`, never on chunk ids.
pub fn chunk_id(parent_id: &str, index: usize) -> String {
    let name = format!("{}:{}", parent_id, index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// A unit of source content to be indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable id, derived from `source_ref` via [`document_id`].
    pub id: String,
    /// Raw text content.
    pub content: String,
    /// URI or filename the content came from.
    pub source_ref: String,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form metadata carried through to every chunk.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Create a document with its id derived from the source reference.
    pub fn new(source_ref: impl Into<String>, content: impl Into<String>) -> Self {
        let source_ref = source_ref.into();
        Self {
            id: document_id(&source_ref),
            content: content.into(),
            source_ref,
            title: None,
            doc_type: None,
            tags: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A bounded-size slice of a document, the unit actually embedded and indexed.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// Back-reference to the parent document. Stored on every chunk so
    /// deletion can address a whole document across re-indexing runs.
    pub parent_id: String,
    pub content: String,
    pub chunk_index: usize,
    /// Final only after the whole split is produced.
    pub total_chunks: usize,
    pub source_ref: String,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    /// Populated by the embedding step, `None` until then.
    pub embedding: Option<Vec<f32>>,
}

/// Which backend(s) contributed a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Semantic,
    Keyword,
    /// The same content surfaced from both backends during fusion.
    Hybrid,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Semantic => write!(f, "semantic"),
            Provenance::Keyword => write!(f, "keyword"),
            Provenance::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A ranked hit returned to the caller.
///
/// `combined_score` is always populated: for fused results it is the
/// weighted sum of the per-backend scores, for single-mode results it
/// equals the backend's native score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    /// Native score from the backend that first produced this result.
    pub score: f64,
    pub provenance: Provenance,
    pub source_ref: Option<String>,
    pub title: Option<String>,
    pub metadata: Map<String, Value>,
    pub semantic_score: Option<f64>,
    pub keyword_score: Option<f64>,
    pub combined_score: f64,
}

/// Outcome of one backend's write (or delete) during a sync operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WriteOutcome {
    Ok,
    Failed { error: String },
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Ok)
    }

    pub(crate) fn from_result(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => WriteOutcome::Ok,
            Err(e) => WriteOutcome::Failed {
                error: format!("{:#}", e),
            },
        }
    }
}

/// Per-backend report for one indexing call.
///
/// Partial success (one backend wrote, the other failed) is a valid
/// outcome; the caller decides whether to retry the failed side.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub document_id: String,
    pub chunk_count: usize,
    pub semantic: WriteOutcome,
    pub keyword: WriteOutcome,
}

impl IndexReport {
    /// True when both backends accepted the write.
    pub fn fully_indexed(&self) -> bool {
        self.semantic.is_ok() && self.keyword.is_ok()
    }
}

/// Per-backend report for one deletion call.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub document_id: String,
    pub semantic: WriteOutcome,
    pub keyword: WriteOutcome,
}

//! # Lattice Search
//!
//! A hybrid retrieval core: documents are chunked on sentence
//! boundaries, embedded, and written to two independent backends — a
//! vector similarity index and a keyword (BM25-style) index. At query
//! time both backends are searched concurrently and their result sets
//! are fused into one ranked, deduplicated list by weighted score
//! combination with content-hash deduplication.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   Document ────▶│   Indexer    │── chunk ── embed ──┐
//!                 └──────────────┘                    │ parallel writes
//!                                          ┌──────────┴──────────┐
//!                                          ▼                     ▼
//!                                   ┌────────────┐        ┌────────────┐
//!                                   │  Semantic  │        │  Keyword   │
//!                                   │  backend   │        │  backend   │
//!                                   └─────┬──────┘        └─────┬──────┘
//!                                          ▼ parallel reads     ▼
//!                 ┌──────────────┐   ┌──────────────────────────────┐
//!   Query ───────▶│ HybridClient │──▶│  Fuser: dedup by content     │
//!                 └──────────────┘   │  fingerprint, weighted sum,  │
//!                                    │  rank, truncate to limit     │
//!                                    └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration, load-time validation |
//! | [`models`] | Documents, chunks, search results, write reports |
//! | [`chunk`] | Sentence-boundary chunker |
//! | [`embedding`] | Embedding provider trait + Ollama-compatible HTTP client |
//! | [`backend`] | Backend traits and normalized hit types |
//! | [`qdrant`] | Qdrant-compatible semantic backend |
//! | [`meili`] | Meilisearch-compatible keyword backend |
//! | [`indexer`] | Chunk + embed + dual-backend sync writes |
//! | [`search`] | Concurrent sub-queries and result fusion |
//! | [`memory`] | In-memory backends and embedder for tests/offline use |
//! | [`engine`] | Component wiring from configuration |
//! | [`blocking`] | Synchronous wrapper over the async core |

pub mod backend;
pub mod blocking;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod indexer;
pub mod meili;
pub mod memory;
pub mod models;
pub mod qdrant;
pub mod search;

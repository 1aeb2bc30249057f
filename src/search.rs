//! Hybrid search client and result fusion.
//!
//! `search()` fans out one semantic and one keyword sub-query
//! concurrently, each over-fetching `2×limit` candidates, then fuses the
//! two result sets into a single ranked list. The join key across the
//! two backends' identifier spaces is a content fingerprint, not an id:
//! text is lowercased, whitespace-collapsed, truncated to the first
//! [`FINGERPRINT_WORDS`] words, and hashed.
//!
//! A failing backend degrades the query to single-mode instead of
//! failing it; each sub-query catches its own error so the log always
//! names which backend fell over.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{BackendHit, FilterMap, KeywordBackend, SemanticBackend};
use crate::config::{normalize_weights, SearchConfig};
use crate::embedding::Embedder;
use crate::models::{Provenance, SearchResult};

/// Number of leading words of normalized content that feed the
/// deduplication fingerprint. A tuning constant, not a load-bearing
/// invariant: it only needs to be long enough that distinct chunks
/// rarely collide and short enough that trailing snippet differences
/// don't split one result in two.
pub const FINGERPRINT_WORDS: usize = 100;

/// Over-fetch factor per sub-query, to compensate for dedup loss.
const CANDIDATE_FACTOR: usize = 2;

/// Content fingerprint used to recognize "the same result" across both
/// backends: lowercase, collapse whitespace, keep the first
/// [`FINGERPRINT_WORDS`] words, hash.
pub fn fingerprint(text: &str) -> String {
    let normalized = text
        .to_lowercase()
        .split_whitespace()
        .take(FINGERPRINT_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Per-call overrides; unset fields fall back to the configured defaults.
#[derive(Debug, Default, Clone)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub filters: FilterMap,
    pub semantic_weight: Option<f64>,
    pub keyword_weight: Option<f64>,
    pub min_score: Option<f64>,
}

/// Query-time orchestrator over the two backends and the embedder.
pub struct HybridClient {
    embedder: Arc<dyn Embedder>,
    semantic: Arc<dyn SemanticBackend>,
    keyword: Arc<dyn KeywordBackend>,
    defaults: SearchConfig,
}

impl HybridClient {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        semantic: Arc<dyn SemanticBackend>,
        keyword: Arc<dyn KeywordBackend>,
        defaults: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            semantic,
            keyword,
            defaults,
        }
    }

    /// Hybrid search: both backends queried concurrently, results fused,
    /// deduplicated, and ranked by weighted combined score.
    ///
    /// Weight validation happens before any network call. An embedding
    /// failure aborts the query; a failing search backend does not.
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let (w_semantic, w_keyword) = normalize_weights(
            opts.semantic_weight.unwrap_or(self.defaults.semantic_weight),
            opts.keyword_weight.unwrap_or(self.defaults.keyword_weight),
        )?;
        let limit = opts.limit.unwrap_or(self.defaults.default_limit);
        let fetch = limit * CANDIDATE_FACTOR;

        let query_vector = self.embedder.embed(query).await?;

        let semantic_hits = async {
            match self.semantic.query(&query_vector, fetch, &opts.filters).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "semantic query failed; degrading to keyword-only");
                    Vec::new()
                }
            }
        };
        let keyword_hits = async {
            match self.keyword.query(query, fetch, &opts.filters).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "keyword query failed; degrading to semantic-only");
                    Vec::new()
                }
            }
        };
        let (semantic_hits, keyword_hits) = tokio::join!(semantic_hits, keyword_hits);
        debug!(
            semantic = semantic_hits.len(),
            keyword = keyword_hits.len(),
            "sub-queries complete"
        );

        let mut fused = fuse(&semantic_hits, &keyword_hits, w_semantic, w_keyword);

        if let Some(floor) = opts.min_score.or(self.defaults.min_score) {
            // Inclusive floor: a result scoring exactly min_score stays.
            fused.retain(|r| r.combined_score >= floor);
        }
        fused.truncate(limit);
        Ok(fused)
    }

    /// Semantic-only search: native backend scores, no fusion or dedup.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: Option<usize>,
        filters: &FilterMap,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.defaults.default_limit);
        let vector = self.embedder.embed(query).await?;
        let hits = self.semantic.query(&vector, limit, filters).await?;
        Ok(hits
            .into_iter()
            .map(|hit| single_mode_result(hit, Provenance::Semantic))
            .collect())
    }

    /// Keyword-only search: native backend scores, no fusion or dedup.
    pub async fn keyword_search(
        &self,
        query: &str,
        limit: Option<usize>,
        filters: &FilterMap,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.defaults.default_limit);
        let hits = self.keyword.query(query, limit, filters).await?;
        Ok(hits
            .into_iter()
            .map(|hit| single_mode_result(hit, Provenance::Keyword))
            .collect())
    }

    /// Probe all three collaborators and report each independently.
    pub async fn status(&self) -> Vec<ComponentStatus> {
        let (semantic, keyword, embedding) = tokio::join!(
            self.semantic.ping(),
            self.keyword.ping(),
            self.embedder.ping()
        );
        vec![
            ComponentStatus::from_result("semantic-backend", semantic),
            ComponentStatus::from_result("keyword-backend", keyword),
            ComponentStatus::from_result("embedding-provider", embedding)
                .with_detail(self.embedder.model_name()),
        ]
    }
}

/// Reachability of one collaborator, for the status surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentStatus {
    pub component: String,
    pub ok: bool,
    /// Extra identifying information, e.g. the embedding model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentStatus {
    fn from_result(component: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                component: component.to_string(),
                ok: true,
                detail: None,
                error: None,
            },
            Err(e) => Self {
                component: component.to_string(),
                ok: false,
                detail: None,
                error: Some(format!("{:#}", e)),
            },
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

fn single_mode_result(hit: BackendHit, provenance: Provenance) -> SearchResult {
    let (semantic_score, keyword_score) = match provenance {
        Provenance::Semantic => (Some(hit.score), None),
        _ => (None, Some(hit.score)),
    };
    SearchResult {
        id: hit.id,
        content: hit.content,
        score: hit.score,
        provenance,
        source_ref: hit.source_ref,
        title: hit.title,
        metadata: hit.metadata,
        semantic_score,
        keyword_score,
        combined_score: hit.score,
    }
}

/// Fuse the two result sets into one ranked, deduplicated list.
///
/// Two passes over the accumulator: semantic hits first, then keyword
/// hits. A hit whose fingerprint is already present fills in the missing
/// score field, recomputes the combined score from both weighted terms,
/// and upgrades provenance to `hybrid` — so content found by both
/// backends always outranks a single-backend hit, all else equal.
///
/// The final sort is stable and descending by combined score; ties keep
/// insertion order (semantic-pass results before keyword-pass results).
pub fn fuse(
    semantic: &[BackendHit],
    keyword: &[BackendHit],
    semantic_weight: f64,
    keyword_weight: f64,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = Vec::with_capacity(semantic.len() + keyword.len());
    let mut by_fingerprint: HashMap<String, usize> = HashMap::new();

    for hit in semantic {
        let fp = fingerprint(&hit.content);
        match by_fingerprint.get(&fp) {
            Some(&i) => {
                // Same content twice from one backend: keep the
                // higher-ranked occurrence.
                let entry = &mut results[i];
                if entry.semantic_score.is_none() {
                    entry.semantic_score = Some(hit.score);
                    recompute(entry, semantic_weight, keyword_weight);
                }
            }
            None => {
                by_fingerprint.insert(fp, results.len());
                results.push(SearchResult {
                    id: hit.id.clone(),
                    content: hit.content.clone(),
                    score: hit.score,
                    provenance: Provenance::Semantic,
                    source_ref: hit.source_ref.clone(),
                    title: hit.title.clone(),
                    metadata: hit.metadata.clone(),
                    semantic_score: Some(hit.score),
                    keyword_score: None,
                    combined_score: hit.score * semantic_weight,
                });
            }
        }
    }

    for hit in keyword {
        let fp = fingerprint(&hit.content);
        match by_fingerprint.get(&fp) {
            Some(&i) => {
                let entry = &mut results[i];
                if entry.keyword_score.is_none() {
                    entry.keyword_score = Some(hit.score);
                    recompute(entry, semantic_weight, keyword_weight);
                }
            }
            None => {
                by_fingerprint.insert(fp, results.len());
                results.push(SearchResult {
                    id: hit.id.clone(),
                    content: hit.content.clone(),
                    score: hit.score,
                    provenance: Provenance::Keyword,
                    source_ref: hit.source_ref.clone(),
                    title: hit.title.clone(),
                    metadata: hit.metadata.clone(),
                    semantic_score: None,
                    keyword_score: Some(hit.score),
                    combined_score: hit.score * keyword_weight,
                });
            }
        }
    }

    // sort_by is stable, so equal scores keep insertion order.
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

fn recompute(entry: &mut SearchResult, semantic_weight: f64, keyword_weight: f64) {
    entry.combined_score = entry.semantic_score.unwrap_or(0.0) * semantic_weight
        + entry.keyword_score.unwrap_or(0.0) * keyword_weight;
    if entry.semantic_score.is_some() && entry.keyword_score.is_some() {
        entry.provenance = Provenance::Hybrid;
    }
}

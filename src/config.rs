//! Configuration loading and validation.
//!
//! Resolution order: built-in defaults → TOML file → environment
//! overrides (`LATTICE_*`) → validation. Components receive their
//! configuration at construction time; there is no ambient global state.
//!
//! Search weights are normalized to sum to 1.0 at load time, so a config
//! of `semantic_weight = 7, keyword_weight = 3` behaves identically to
//! `0.7 / 0.3`. A zero (or negative) total is a configuration error and
//! fails here, before any backend is contacted.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub semantic: SemanticBackendConfig,
    #[serde(default)]
    pub keyword: KeywordBackendConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

/// Vector similarity backend (Qdrant-compatible HTTP API).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SemanticBackendConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub collection: String,
    /// Per-call timeout for search requests, in seconds.
    pub timeout_secs: u64,
    /// Per-call timeout for upsert/delete requests, in seconds.
    pub write_timeout_secs: u64,
}

impl Default for SemanticBackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6333".to_string(),
            api_key: None,
            collection: "lattice_chunks".to_string(),
            timeout_secs: 30,
            write_timeout_secs: 60,
        }
    }
}

/// Keyword (BM25-style) backend (Meilisearch-compatible HTTP API).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KeywordBackendConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub index: String,
    pub timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub searchable_attributes: Vec<String>,
    /// Must include `parent_id`; document deletion is keyed on it.
    pub filterable_attributes: Vec<String>,
}

impl Default for KeywordBackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7700".to_string(),
            api_key: None,
            index: "lattice_chunks".to_string(),
            timeout_secs: 30,
            write_timeout_secs: 60,
            searchable_attributes: vec!["content".to_string(), "title".to_string()],
            filterable_attributes: vec![
                "parent_id".to_string(),
                "doc_type".to_string(),
                "tags".to_string(),
                "source_ref".to_string(),
            ],
        }
    }
}

/// Embedding provider (Ollama-compatible HTTP API).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub url: String,
    pub model: String,
    /// Declared dimensionality. Must match what the model actually
    /// produces; a mismatch is detected before anything is written.
    pub dims: usize,
    pub batch_size: usize,
    /// Generous by default: first call may trigger a model load.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Opt-in fallback: substitute a zero vector of `dims` length when
    /// the provider returns an empty embedding, instead of failing.
    pub allow_degraded: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dims: 768,
            batch_size: 32,
            timeout_secs: 120,
            max_retries: 3,
            allow_degraded: false,
        }
    }
}

/// Query-time defaults, overridable per call.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    /// Inclusive floor on `combined_score`; `None` disables filtering.
    #[serde(default)]
    pub min_score: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            min_score: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in whitespace-delimited words.
    pub chunk_size: usize,
    /// Trailing overlap window in words, seeded as whole sentences.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// Normalize a weight pair so the two sum to 1.0.
///
/// Errors on negative weights and on a zero total — the division would
/// otherwise blow up at query time, so it is rejected up front.
pub fn normalize_weights(semantic: f64, keyword: f64) -> Result<(f64, f64)> {
    if semantic < 0.0 || keyword < 0.0 {
        bail!("search weights must be non-negative (got semantic={semantic}, keyword={keyword})");
    }
    let total = semantic + keyword;
    if total <= 0.0 {
        bail!("search weights must sum to a positive value (got semantic={semantic}, keyword={keyword})");
    }
    Ok((semantic / total, keyword / total))
}

impl Config {
    /// Load configuration: defaults, then the TOML file (if given), then
    /// `LATTICE_*` environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {}", p.display()))?;
                toml::from_str(&content).with_context(|| "Failed to parse config file")?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        env_string("LATTICE_SEMANTIC_URL", &mut self.semantic.url);
        env_opt_string("LATTICE_SEMANTIC_API_KEY", &mut self.semantic.api_key);
        env_string("LATTICE_SEMANTIC_COLLECTION", &mut self.semantic.collection);
        env_parse("LATTICE_SEMANTIC_TIMEOUT_SECS", &mut self.semantic.timeout_secs)?;

        env_string("LATTICE_KEYWORD_URL", &mut self.keyword.url);
        env_opt_string("LATTICE_KEYWORD_API_KEY", &mut self.keyword.api_key);
        env_string("LATTICE_KEYWORD_INDEX", &mut self.keyword.index);
        env_parse("LATTICE_KEYWORD_TIMEOUT_SECS", &mut self.keyword.timeout_secs)?;
        env_list("LATTICE_SEARCHABLE_ATTRIBUTES", &mut self.keyword.searchable_attributes);
        env_list("LATTICE_FILTERABLE_ATTRIBUTES", &mut self.keyword.filterable_attributes);

        env_string("LATTICE_EMBEDDING_URL", &mut self.embedding.url);
        env_string("LATTICE_EMBEDDING_MODEL", &mut self.embedding.model);
        env_parse("LATTICE_EMBEDDING_DIMS", &mut self.embedding.dims)?;
        env_parse("LATTICE_EMBEDDING_BATCH_SIZE", &mut self.embedding.batch_size)?;

        env_parse("LATTICE_DEFAULT_LIMIT", &mut self.search.default_limit)?;
        env_parse("LATTICE_SEMANTIC_WEIGHT", &mut self.search.semantic_weight)?;
        env_parse("LATTICE_KEYWORD_WEIGHT", &mut self.search.keyword_weight)?;
        if let Ok(v) = std::env::var("LATTICE_MIN_SCORE") {
            let parsed: f64 = v
                .parse()
                .with_context(|| format!("Invalid LATTICE_MIN_SCORE: {v}"))?;
            self.search.min_score = Some(parsed);
        }

        env_parse("LATTICE_CHUNK_SIZE", &mut self.chunking.chunk_size)?;
        env_parse("LATTICE_CHUNK_OVERLAP", &mut self.chunking.chunk_overlap)?;
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.search.default_limit == 0 {
            bail!("search.default_limit must be >= 1");
        }
        if !self
            .keyword
            .filterable_attributes
            .iter()
            .any(|a| a == "parent_id")
        {
            bail!("keyword.filterable_attributes must include 'parent_id' (required for deletion)");
        }

        // Store the normalized weights so every downstream consumer sees
        // an effective pair summing to 1.0.
        let (s, k) = normalize_weights(self.search.semantic_weight, self.search.keyword_weight)?;
        self.search.semantic_weight = s;
        self.search.keyword_weight = k;
        Ok(())
    }
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(v) = std::env::var(key) {
        *target = v;
    }
}

fn env_opt_string(key: &str, target: &mut Option<String>) {
    if let Ok(v) = std::env::var(key) {
        *target = Some(v);
    }
}

fn env_list(key: &str, target: &mut Vec<String>) {
    if let Ok(v) = std::env::var(key) {
        *target = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Ok(v) = std::env::var(key) {
        *target = v
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key}: {e}"))?;
    }
    Ok(())
}

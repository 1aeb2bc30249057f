//! # Lattice CLI (`lattice`)
//!
//! Thin command-line surface over the library:
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lattice index <path>` | Chunk, embed, and index a text file into both backends |
//! | `lattice search "<query>"` | Hybrid (or single-mode) search |
//! | `lattice delete <source-ref>` | Remove a document's chunks from both backends |
//! | `lattice status` | Probe both backends and the embedding provider |
//!
//! All commands accept `--config` pointing to a TOML file; every option
//! can also be overridden via `LATTICE_*` environment variables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lattice_search::backend::FilterMap;
use lattice_search::config::Config;
use lattice_search::engine::Engine;
use lattice_search::models::{document_id, Document, SearchResult};
use lattice_search::search::SearchOptions;

#[derive(Parser)]
#[command(name = "lattice", version, about = "Hybrid semantic + keyword search")]
struct Cli {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    Hybrid,
    Semantic,
    Keyword,
}

#[derive(Subcommand)]
enum Command {
    /// Index a text or markdown file.
    Index {
        path: PathBuf,
        /// Title to store with the document; defaults to the file name.
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        doc_type: Option<String>,
        /// Repeatable document tag.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Search the indexed corpus.
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = Mode::Hybrid)]
        mode: Mode,
        #[arg(long)]
        limit: Option<usize>,
        /// Repeatable `key=value` filter.
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        semantic_weight: Option<f64>,
        #[arg(long)]
        keyword_weight: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a previously indexed document by its source reference.
    Delete {
        source_ref: String,
        #[arg(long)]
        json: bool,
    },
    /// Probe both backends and the embedding provider.
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn parse_filters(raw: &[String]) -> Result<FilterMap> {
    let mut filters = FilterMap::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid filter '{pair}': expected key=value");
        };
        filters.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
    }
    Ok(filters)
}

fn print_results(results: &[SearchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] ({}) {}",
            i + 1,
            result.combined_score,
            result.provenance,
            result.title.as_deref().unwrap_or("(untitled)")
        );
        if let Some(source) = &result.source_ref {
            println!("    source: {}", source);
        }
        let excerpt: String = result.content.chars().take(200).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        println!();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let engine = Engine::from_config(&config)?;

    match cli.command {
        Command::Index {
            path,
            title,
            doc_type,
            tags,
            json,
        } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let source_ref = path.to_string_lossy().to_string();
            let title = title.or_else(|| {
                path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
            });

            let mut doc = Document::new(source_ref, content).with_tags(tags);
            doc.title = title;
            doc.doc_type = doc_type;

            let report = engine.indexer.index_document(&doc).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "indexed {} ({} chunks): semantic={:?} keyword={:?}",
                    report.document_id, report.chunk_count, report.semantic, report.keyword
                );
            }
            if !report.fully_indexed() {
                std::process::exit(1);
            }
        }
        Command::Search {
            query,
            mode,
            limit,
            filters,
            semantic_weight,
            keyword_weight,
            json,
        } => {
            let filters = parse_filters(&filters)?;
            let results = match mode {
                Mode::Hybrid => {
                    let opts = SearchOptions {
                        limit,
                        filters,
                        semantic_weight,
                        keyword_weight,
                        min_score: None,
                    };
                    engine.client.search(&query, &opts).await?
                }
                Mode::Semantic => engine.client.semantic_search(&query, limit, &filters).await?,
                Mode::Keyword => engine.client.keyword_search(&query, limit, &filters).await?,
            };
            print_results(&results, json)?;
        }
        Command::Delete { source_ref, json } => {
            let id = document_id(&source_ref);
            let report = engine.indexer.delete_document(&id).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "deleted {}: semantic={:?} keyword={:?}",
                    report.document_id, report.semantic, report.keyword
                );
            }
        }
        Command::Status { json } => {
            let statuses = engine.client.status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                for status in &statuses {
                    let label = match &status.detail {
                        Some(detail) => format!("{} ({})", status.component, detail),
                        None => status.component.clone(),
                    };
                    match &status.error {
                        None => println!("{:<32} ok", label),
                        Some(e) => println!("{:<32} unreachable: {}", label, e),
                    }
                }
            }
        }
    }

    Ok(())
}

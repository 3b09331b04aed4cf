// CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tokio::fs;
use uuid::Uuid;

use crate::Result;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::indexer::Indexer;
use crate::retrieval::{SearchFilters, SearchRequest};
use crate::storage::metadata::models::{FileFilter, NewFileRecord};

/// Ingest local text documents into the library.
#[inline]
pub async fn add_files(
    paths: &[PathBuf],
    category: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    let config = Config::load_default()?;
    let indexer = Indexer::from_config(&config).await?;

    let progress = ProgressBar::new(paths.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for path in paths {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let file = new_file_record(path, &text, category.clone(), tags.clone());
        progress.set_message(file.name.clone());

        let outcome = indexer.ingest_document(file, &text).await?;
        progress.inc(1);

        println!(
            "{} {} ({} chunks, {} embeddings)",
            style("Ingested").green(),
            path.display(),
            outcome.chunks_created,
            outcome.embeddings_stored
        );
    }

    progress.finish_and_clear();
    Ok(())
}

fn new_file_record(
    path: &Path,
    text: &str,
    category: Option<String>,
    tags: Vec<String>,
) -> NewFileRecord {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let file_type = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "text".to_string());

    NewFileRecord {
        file_id: Uuid::new_v4().to_string(),
        name,
        path: path.display().to_string(),
        file_type,
        category: category.unwrap_or_else(|| "Documents".to_string()),
        summary: None,
        tags,
        size: text.len() as i64,
    }
}

/// Run a semantic search and print the ranked results.
#[inline]
pub async fn search(
    query: String,
    limit: usize,
    threshold: f32,
    category: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    let config = Config::load_default()?;
    let indexer = Indexer::from_config(&config).await?;
    let coordinator = indexer.search_coordinator();

    let request = SearchRequest {
        query,
        limit,
        similarity_threshold: threshold,
        filters: SearchFilters {
            categories: category.map(|c| vec![c]),
            tags: if tags.is_empty() { None } else { Some(tags) },
            ..SearchFilters::default()
        },
        include_context: true,
    };

    let hits = coordinator.search(&request).await?;

    if hits.is_empty() {
        println!("{}", style("No results above the similarity threshold").dim());
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{} {} {}",
            style(format!("{}.", rank + 1)).bold(),
            style(&hit.file_name).cyan(),
            style(format!("(score {:.3})", hit.similarity_score)).dim()
        );
        println!("   {}", hit.content);
        if let Some(previous) = &hit.context.previous {
            println!("   {} {}", style("prev:").dim(), style(previous).dim());
        }
        if let Some(next) = &hit.context.next {
            println!("   {} {}", style("next:").dim(), style(next).dim());
        }
    }

    Ok(())
}

/// List files in the library, one page at a time.
#[inline]
pub async fn list_files(page: u32, category: Option<String>, search_term: Option<String>) -> Result<()> {
    let config = Config::load_default()?;
    let indexer = Indexer::from_config(&config).await?;
    let database = indexer.database();

    let filter = FileFilter {
        category,
        search: search_term,
    };
    let listing = database.list_files(page, 20, &filter).await?;

    if listing.files.is_empty() {
        println!("{}", style("No files found").dim());
        return Ok(());
    }

    for file in &listing.files {
        let tags = file.tag_list();
        let tag_text = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.iter().join(", "))
        };
        println!(
            "{}  {}  {}{}",
            style(&file.file_id).dim(),
            style(&file.name).cyan(),
            file.category,
            style(tag_text).dim()
        );
    }

    println!(
        "{}",
        style(format!(
            "Page {} - {} of {} files",
            page.max(1),
            listing.files.len(),
            listing.total_count
        ))
        .dim()
    );

    Ok(())
}

/// Delete a file, its chunks, and its vectors (logically).
#[inline]
pub async fn delete_file(file_id: String) -> Result<()> {
    let config = Config::load_default()?;
    let indexer = Indexer::from_config(&config).await?;

    let deleted = indexer.delete_document(&file_id).await?;
    if deleted > 0 {
        println!(
            "{} {} ({} vectors logically deleted; run `rebuild` to reclaim space)",
            style("Deleted").green(),
            file_id,
            deleted
        );
    } else {
        println!("{} {}", style("Not found:").yellow(), file_id);
    }

    Ok(())
}

/// Validate store consistency, then rebuild the vector index.
#[inline]
pub async fn rebuild_index() -> Result<()> {
    let config = Config::load_default()?;
    let indexer = Indexer::from_config(&config).await?;

    let report = indexer.validate_consistency().await?;
    println!("{}", report.summary());

    let outcome = indexer.rebuild_index().await?;
    println!(
        "{} {} entries ({} reused, {} re-embedded), {} slots purged",
        style("Rebuilt:").green(),
        outcome.entries,
        outcome.reused_vectors,
        outcome.reembedded,
        outcome.purged_slots
    );

    indexer.database().optimize().await?;

    Ok(())
}

/// Show library and index statistics.
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load_default()?;
    let indexer = Indexer::from_config(&config).await?;

    let stats = indexer.statistics().await?;
    println!(
        "Files: {} ({} processed)",
        stats.library.total_files, stats.library.processed_files
    );
    println!("Chunks: {}", stats.library.total_chunks);
    println!(
        "Vectors: {} live / {} slots ({} logically deleted), dimension {}",
        stats.live_vectors, stats.physical_slots, stats.deleted_slots, stats.dimension
    );

    if !stats.library.files_per_category.is_empty() {
        println!("Categories:");
        for (cat, count) in &stats.library.files_per_category {
            println!("  {cat}: {count}");
        }
    }

    let client = OllamaClient::new(&config.ollama)?;
    match client.ping() {
        Ok(()) => println!("Embedding service: {}", style("reachable").green()),
        Err(e) => println!("Embedding service: {} ({e})", style("unreachable").yellow()),
    }

    Ok(())
}

/// Print the active configuration as TOML.
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default()?;
    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| crate::VaultError::Config(e.to_string()))?;
    println!("# {}", config.base_dir().join("config.toml").display());
    print!("{rendered}");
    Ok(())
}

// End-to-end exercise of the ingestion and retrieval pipeline with a
// deterministic in-process embedding provider.

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::RwLock;

use docvault::Result;
use docvault::embeddings::EmbeddingProvider;
use docvault::embeddings::chunking::ChunkingConfig;
use docvault::indexer::{Indexer, IndexerOptions};
use docvault::retrieval::{SearchFilters, SearchRequest};
use docvault::storage::metadata::Database;
use docvault::storage::metadata::models::NewFileRecord;
use docvault::storage::vector::VectorIndex;

const KEYWORDS: [&str; 4] = ["rust", "bread", "piano", "sql"];

/// Embeds text as keyword occurrence counts, so similarity between a query
/// and a chunk is simply topical overlap.
struct KeywordEmbedder;

impl EmbeddingProvider for KeywordEmbedder {
    fn dimension(&self) -> usize {
        KEYWORDS.len()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|keyword| lowered.matches(keyword).count() as f32)
            .collect())
    }
}

async fn build_indexer(dir: &TempDir) -> Indexer {
    let database = Database::new(dir.path().join("metadata.db"))
        .await
        .expect("can create database");
    let index = VectorIndex::new(KEYWORDS.len()).expect("can create index");

    Indexer::new(
        database,
        Arc::new(RwLock::new(index)),
        Arc::new(KeywordEmbedder),
        IndexerOptions {
            chunking: ChunkingConfig {
                max_chunk_chars: 48,
                hard_split_oversized: false,
            },
            vector_dir: dir.path().join("vectors"),
            ingest_timeout: None,
            max_concurrent_files: 2,
        },
    )
}

fn file(file_id: &str, category: &str) -> NewFileRecord {
    NewFileRecord {
        file_id: file_id.to_string(),
        name: format!("{file_id}.md"),
        path: format!("/library/{file_id}.md"),
        file_type: "md".to_string(),
        category: category.to_string(),
        summary: None,
        tags: Vec::new(),
        size: 0,
    }
}

#[tokio::test]
async fn ingest_search_delete_rebuild_cycle() {
    let dir = TempDir::new().expect("can create temp dir");
    let indexer = build_indexer(&dir).await;

    indexer
        .ingest_document(
            file("rust-notes", "Programming"),
            "Rust ownership is strict. The rust borrow checker enforces it. \
             Rust lifetimes annotate borrows.",
        )
        .await
        .expect("ingest succeeds");
    indexer
        .ingest_document(
            file("baking", "Cooking"),
            "Good bread needs time. Knead the bread dough well. \
             Bake the bread until golden.",
        )
        .await
        .expect("ingest succeeds");

    let coordinator = indexer.search_coordinator();

    // Topical query lands on the matching document, ranked by similarity.
    let request = SearchRequest {
        similarity_threshold: 0.5,
        ..SearchRequest::new("how does rust handle ownership")
    };
    let hits = coordinator.search(&request).await.expect("search succeeds");

    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.file_id == "rust-notes"));
    for pair in hits.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }

    // Context stitching pulls neighbors from the same file.
    let top = &hits[0];
    assert!(top.context.previous.is_some() || top.context.next.is_some());

    // Category filters drop the other document entirely.
    let filtered = SearchRequest {
        similarity_threshold: 0.0,
        filters: SearchFilters {
            categories: Some(vec!["Cooking".to_string()]),
            ..SearchFilters::default()
        },
        ..SearchRequest::new("bread")
    };
    let hits = coordinator.search(&filtered).await.expect("search succeeds");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.file_id == "baking"));

    // Deletion hides the file from search immediately (logical delete)...
    indexer
        .delete_document("rust-notes")
        .await
        .expect("delete succeeds");

    let request = SearchRequest {
        similarity_threshold: 0.5,
        ..SearchRequest::new("how does rust handle ownership")
    };
    let hits = coordinator.search(&request).await.expect("search succeeds");
    assert!(hits.is_empty());

    // ...while the physical slots linger until a rebuild reclaims them.
    {
        let index = indexer.index();
        let guard = index.read().await;
        assert!(guard.deleted_count() > 0);
    }

    let outcome = indexer.rebuild_index().await.expect("rebuild succeeds");
    assert_eq!(outcome.reembedded, 0);

    {
        let index = indexer.index();
        let guard = index.read().await;
        assert_eq!(guard.deleted_count(), 0);
        assert_eq!(guard.len(), outcome.entries);
    }

    let report = indexer
        .validate_consistency()
        .await
        .expect("validation runs");
    assert!(report.is_consistent);

    // The surviving document is still searchable after the rebuild.
    let request = SearchRequest {
        similarity_threshold: 0.5,
        ..SearchRequest::new("bread baking")
    };
    let hits = coordinator.search(&request).await.expect("search succeeds");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.file_id == "baking"));
}

#[tokio::test]
async fn persisted_index_survives_a_restart() {
    let dir = TempDir::new().expect("can create temp dir");

    {
        let indexer = build_indexer(&dir).await;
        indexer
            .ingest_document(
                file("piano", "Music"),
                "Piano practice pays off. Play the piano daily.",
            )
            .await
            .expect("ingest succeeds");
    }

    // A fresh indexer over the same directory loads the persisted pair.
    let database = Database::new(dir.path().join("metadata.db"))
        .await
        .expect("can reopen database");
    let index = docvault::storage::vector::persistence::load(
        &dir.path().join("vectors"),
        KEYWORDS.len(),
    )
    .expect("load succeeds")
    .expect("index present");

    assert!(index.len() > 0);

    let indexer = Indexer::new(
        database,
        Arc::new(RwLock::new(index)),
        Arc::new(KeywordEmbedder),
        IndexerOptions {
            chunking: ChunkingConfig::default(),
            vector_dir: dir.path().join("vectors"),
            ingest_timeout: None,
            max_concurrent_files: 2,
        },
    );

    let coordinator = indexer.search_coordinator();
    let request = SearchRequest {
        similarity_threshold: 0.5,
        ..SearchRequest::new("piano lessons")
    };
    let hits = coordinator.search(&request).await.expect("search succeeds");

    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.file_id == "piano"));
}

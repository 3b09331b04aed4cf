// Indexer module
// This module drives ingestion, deletion, and index/metadata reconciliation

pub mod consistency;


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::chunking::{ChunkingConfig, chunk_text};
use crate::embeddings::{EmbeddingProvider, OllamaClient};
use crate::retrieval::SearchCoordinator;
use crate::storage::metadata::Database;
use crate::storage::metadata::models::{
    FileUpdate, LibraryStatistics, NewChunkRecord, NewFileRecord,
};
use crate::storage::vector::{SharedVectorIndex, VectorIndex, persistence};
use crate::{Result, VaultError};

pub use consistency::{ConsistencyChecker, ConsistencyReport, RebuildOutcome};

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub chunking: ChunkingConfig,
    /// Directory holding the paired vector index artifacts.
    pub vector_dir: PathBuf,
    /// Caller-level timeout wrapping one whole ingest request. On expiry
    /// the request is abandoned; already-written data remains valid and a
    /// re-run converges because chunk ids are deterministic.
    pub ingest_timeout: Option<Duration>,
    /// Upper bound on files ingested concurrently in a batch. Chunks within
    /// a single file stay sequential; embedding generation is the
    /// bottleneck.
    pub max_concurrent_files: usize,
}

/// Ingests documents into both stores and keeps the vector index persisted.
pub struct Indexer {
    database: Database,
    index: SharedVectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    options: IndexerOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub file_id: String,
    pub chunks_created: usize,
    pub embeddings_stored: usize,
}

/// Library statistics joined with the index's physical state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatistics {
    pub library: LibraryStatistics,
    pub dimension: usize,
    pub live_vectors: usize,
    pub physical_slots: usize,
    pub deleted_slots: usize,
}

impl Indexer {
    #[inline]
    pub fn new(
        database: Database,
        index: SharedVectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        options: IndexerOptions,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
            options,
        }
    }

    /// Compose an indexer from configuration: the SQLite metadata store,
    /// the persisted vector pair (or a fresh index), and the Ollama client.
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let database = Database::initialize_from_base_dir(config.base_dir())
            .await
            .context("Failed to initialize metadata store")?;

        let embedder = OllamaClient::new(&config.ollama)?;

        let dimension = config.ollama.embedding_dimension as usize;
        let vector_dir = config.vector_dir_path();
        let index = match persistence::load(&vector_dir, dimension)? {
            Some(index) => index,
            None => VectorIndex::new(dimension)?,
        };

        Ok(Self::new(
            database,
            Arc::new(RwLock::new(index)),
            Arc::new(embedder),
            IndexerOptions {
                chunking: config.chunking.clone(),
                vector_dir,
                ingest_timeout: config.ingest.timeout(),
                max_concurrent_files: config.ingest.max_concurrent_files,
            },
        ))
    }

    #[inline]
    pub fn database(&self) -> Database {
        self.database.clone()
    }

    #[inline]
    pub fn index(&self) -> SharedVectorIndex {
        Arc::clone(&self.index)
    }

    /// A search coordinator wired to the same stores and provider.
    #[inline]
    pub fn search_coordinator(&self) -> SearchCoordinator {
        SearchCoordinator::new(
            self.database.clone(),
            Arc::clone(&self.index),
            Arc::clone(&self.embedder),
        )
    }

    /// Ingest one document: insert the file record, chunk the text, embed
    /// the chunks, store vectors and chunk rows, mark the file processed.
    #[inline]
    pub async fn ingest_document(&self, file: NewFileRecord, text: &str) -> Result<IngestOutcome> {
        match self.options.ingest_timeout {
            Some(limit) => tokio::time::timeout(limit, self.ingest_inner(file, text))
                .await
                .map_err(|_| {
                    VaultError::Other(anyhow::anyhow!("Ingestion timed out after {limit:?}"))
                })?,
            None => self.ingest_inner(file, text).await,
        }
    }

    async fn ingest_inner(&self, file: NewFileRecord, text: &str) -> Result<IngestOutcome> {
        let file_id = file.file_id.clone();
        info!("Ingesting document {} ({})", file.name, file_id);

        self.database
            .insert_file(&file)
            .await
            .context("Failed to insert file record")?;

        let chunks = chunk_text(text, &self.options.chunking);
        if chunks.is_empty() {
            warn!("Document {} produced no chunks", file_id);
            self.mark_processed(&file_id).await?;
            return Ok(IngestOutcome {
                file_id,
                chunks_created: 0,
                embeddings_stored: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        let mut records = Vec::with_capacity(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            // Chunk ids are deterministic from the file id and position, so
            // a re-run after an interrupted ingest converges on the same
            // rows and slots.
            let chunk_id = format!("{}_chunk_{}", file_id, chunk.chunk_index);

            let Some(vector) = embedding else {
                warn!("Skipping chunk {} with no embedding", chunk_id);
                continue;
            };

            records.push(NewChunkRecord {
                chunk_id: chunk_id.clone(),
                file_id: file_id.clone(),
                chunk_index: chunk.chunk_index as i64,
                content: chunk.content.clone(),
                char_count: chunk.char_count as i64,
                token_count: chunk.token_count as i64,
                embedding_id: chunk_id.clone(),
            });
            vectors.push((chunk_id, vector));
        }

        let chunks_created = records.len();
        self.database
            .insert_chunks(records)
            .await
            .context("Failed to insert chunk records")?;

        let embeddings_stored = vectors.len();
        {
            let mut index = self.index.write().await;
            for (id, vector) in &vectors {
                match index.add(id, vector) {
                    Ok(_) => {}
                    Err(VaultError::DuplicateId(_)) => {
                        debug!("Embedding {} already indexed, keeping existing slot", id);
                    }
                    Err(e) => return Err(e),
                }
            }
            persistence::save(&index, &self.options.vector_dir)?;
        }

        self.mark_processed(&file_id).await?;

        info!(
            "Ingested {} chunks ({} embeddings) for {}",
            chunks_created, embeddings_stored, file_id
        );

        Ok(IngestOutcome {
            file_id,
            chunks_created,
            embeddings_stored,
        })
    }

    /// Ingest independent documents in parallel up to a bounded worker
    /// count. Results are collected in completion order.
    #[inline]
    pub async fn ingest_documents(
        &self,
        documents: Vec<(NewFileRecord, String)>,
    ) -> Result<Vec<IngestOutcome>> {
        let outcomes: Vec<Result<IngestOutcome>> = stream::iter(documents)
            .map(|(file, text)| async move { self.ingest_document(file, &text).await })
            .buffer_unordered(self.options.max_concurrent_files.max(1))
            .collect()
            .await;

        outcomes.into_iter().collect()
    }

    /// Delete a file: transactional metadata cascade, then logical deletes
    /// in the index. Returns the number of vectors logically deleted.
    ///
    /// The physical slots stay until a `rebuild_index`; deletion stays O(1)
    /// per chunk because no rebuild is triggered implicitly.
    #[inline]
    pub async fn delete_document(&self, file_id: &str) -> Result<usize> {
        let chunks = self
            .database
            .get_chunks_for_file(file_id)
            .await
            .context("Failed to list chunks for deletion")?;

        let removed = self
            .database
            .delete_file(file_id)
            .await
            .context("Failed to delete file record")?;

        if !removed {
            warn!("File {} not found for deletion", file_id);
            return Ok(0);
        }

        let mut deleted = 0;
        {
            let mut index = self.index.write().await;
            for chunk in &chunks {
                if index.delete(&chunk.embedding_id) {
                    deleted += 1;
                }
            }
            persistence::save(&index, &self.options.vector_dir)?;
        }

        info!(
            "Deleted file {} and logically removed {} vectors",
            file_id, deleted
        );
        Ok(deleted)
    }

    #[inline]
    pub async fn statistics(&self) -> Result<VaultStatistics> {
        let library = self
            .database
            .statistics()
            .await
            .context("Failed to read library statistics")?;

        let index = self.index.read().await;
        Ok(VaultStatistics {
            library,
            dimension: index.dimension(),
            live_vectors: index.len(),
            physical_slots: index.slot_count(),
            deleted_slots: index.deleted_count(),
        })
    }

    /// Detect drift between the metadata store and the vector index.
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        ConsistencyChecker::new(&self.database, &self.index, &self.embedder)
            .validate()
            .await
    }

    /// Reconstruct the vector index from the metadata store, purging
    /// logically-deleted slots.
    #[inline]
    pub async fn rebuild_index(&self) -> Result<RebuildOutcome> {
        ConsistencyChecker::new(&self.database, &self.index, &self.embedder)
            .rebuild(&self.options.vector_dir)
            .await
    }

    async fn mark_processed(&self, file_id: &str) -> Result<()> {
        let update = FileUpdate {
            processed: Some(true),
            ..Default::default()
        };
        self.database
            .update_file(file_id, update)
            .await
            .context("Failed to mark file processed")?;
        Ok(())
    }
}

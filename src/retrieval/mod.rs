
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::embeddings::EmbeddingProvider;
use crate::storage::metadata::Database;
use crate::storage::metadata::models::{ChunkRecord, FileRecord};
use crate::storage::vector::SharedVectorIndex;
use crate::{Result, VaultError};

/// Over-fetch factor applied to the index search so that candidates dropped
/// during the metadata join (drift, filtered files) do not starve the final
/// result list.
pub const OVERFETCH_FACTOR: usize = 2;

/// Neighboring-chunk previews are truncated to this many characters.
pub const CONTEXT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub similarity_threshold: f32,
    pub filters: SearchFilters,
    pub include_context: bool,
}

impl SearchRequest {
    #[inline]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            similarity_threshold: 0.7,
            filters: SearchFilters::default(),
            include_context: true,
        }
    }
}

/// Caller-supplied constraints on the owning file of a candidate chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchFilters {
    pub file_types: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    /// A file matches when it carries any of these tags.
    pub tags: Option<Vec<String>>,
    /// Explicit allowlist of file ids.
    pub file_ids: Option<Vec<String>>,
}

impl SearchFilters {
    fn matches(&self, file: &FileRecord) -> bool {
        if let Some(file_ids) = &self.file_ids {
            if !file_ids.contains(&file.file_id) {
                return false;
            }
        }

        if let Some(file_types) = &self.file_types {
            if !file_types.contains(&file.file_type) {
                return false;
            }
        }

        if let Some(categories) = &self.categories {
            if !categories.contains(&file.category) {
                return false;
            }
        }

        if let Some(tags) = &self.tags {
            let file_tags = file.tag_list();
            if !tags.iter().any(|tag| file_tags.contains(tag)) {
                return false;
            }
        }

        true
    }
}

/// Truncated text of the chunks adjacent to a hit, by sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkContext {
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// A ranked retrieval result. Ephemeral and request-scoped.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub file_id: String,
    pub file_name: String,
    pub file_path: String,
    pub content: String,
    pub chunk_index: i64,
    pub similarity_score: f32,
    pub context: ChunkContext,
}

/// Orchestrates a search: query embedding, index search, metadata join,
/// context stitching, ranking.
///
/// Holds constructor-injected instances of both stores; there is no hidden
/// process-wide state.
pub struct SearchCoordinator {
    database: Database,
    index: SharedVectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    join_misses: AtomicU64,
}

impl SearchCoordinator {
    #[inline]
    pub fn new(
        database: Database,
        index: SharedVectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
            join_misses: AtomicU64::new(0),
        }
    }

    /// Number of index candidates skipped because their metadata was gone.
    /// Surfaced in aggregate only; a miss never fails a request.
    #[inline]
    pub fn join_miss_count(&self) -> u64 {
        self.join_misses.load(Ordering::Relaxed)
    }

    /// Run the full retrieval pipeline.
    ///
    /// A failed or empty query embedding aborts the whole request with
    /// `EmbeddingFailed`. Failures local to one candidate skip that
    /// candidate and the pipeline continues. Zero qualifying results is a
    /// successful empty list.
    #[inline]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(VaultError::EmbeddingFailed("Query is empty".to_string()));
        }
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let query_vector = match self.embedder.embed(query) {
            Ok(vector) if !vector.is_empty() => vector,
            Ok(_) => {
                return Err(VaultError::EmbeddingFailed(
                    "Provider returned an empty vector".to_string(),
                ));
            }
            Err(e) => return Err(VaultError::EmbeddingFailed(e.to_string())),
        };

        let candidates = {
            let index = self.index.read().await;
            index.search(
                &query_vector,
                request.limit * OVERFETCH_FACTOR,
                request.similarity_threshold,
            )?
        };

        debug!("Index returned {} candidates", candidates.len());

        let mut hits = Vec::with_capacity(request.limit);

        for candidate in candidates {
            if hits.len() == request.limit {
                break;
            }

            let chunk = match self.database.get_chunk_by_embedding_id(&candidate.id).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    self.join_misses.fetch_add(1, Ordering::Relaxed);
                    debug!("No chunk metadata for embedding id {}, skipping", candidate.id);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to resolve chunk for {}: {}", candidate.id, e);
                    continue;
                }
            };

            let file = match self.database.get_file(&chunk.file_id).await {
                Ok(Some(file)) => file,
                Ok(None) => {
                    self.join_misses.fetch_add(1, Ordering::Relaxed);
                    debug!("No file metadata for {}, skipping", chunk.file_id);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to resolve file for {}: {}", chunk.file_id, e);
                    continue;
                }
            };

            if !request.filters.matches(&file) {
                continue;
            }

            let context = if request.include_context {
                self.stitch_context(&chunk).await
            } else {
                ChunkContext::default()
            };

            hits.push(SearchHit {
                chunk_id: chunk.chunk_id,
                file_id: chunk.file_id,
                file_name: file.name,
                file_path: file.path,
                content: chunk.content,
                chunk_index: chunk.chunk_index,
                similarity_score: candidate.score,
                context,
            });
        }

        info!("Search produced {} results", hits.len());
        Ok(hits)
    }

    /// Fetch the chunks immediately before and after `chunk` in its file.
    /// Failures here degrade the hit, never the request.
    async fn stitch_context(&self, chunk: &ChunkRecord) -> ChunkContext {
        let mut context = ChunkContext::default();

        if chunk.chunk_index > 0 {
            match self
                .database
                .get_chunk_by_index(&chunk.file_id, chunk.chunk_index - 1)
                .await
            {
                Ok(Some(previous)) => context.previous = Some(preview(&previous.content)),
                Ok(None) => {}
                Err(e) => warn!("Failed to fetch preceding chunk for {}: {}", chunk.chunk_id, e),
            }
        }

        match self
            .database
            .get_chunk_by_index(&chunk.file_id, chunk.chunk_index + 1)
            .await
        {
            Ok(Some(next)) => context.next = Some(preview(&next.content)),
            Ok(None) => {}
            Err(e) => warn!("Failed to fetch following chunk for {}: {}", chunk.chunk_id, e),
        }

        context
    }
}

/// Char-boundary-safe preview with an ellipsis marking truncation.
fn preview(content: &str) -> String {
    if content.chars().count() <= CONTEXT_PREVIEW_CHARS {
        content.to_string()
    } else {
        let mut truncated: String = content.chars().take(CONTEXT_PREVIEW_CHARS).collect();
        truncated.push_str("...");
        truncated
    }
}

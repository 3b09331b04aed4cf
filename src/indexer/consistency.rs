// Consistency between the metadata store and the vector index
// The index cannot delete in place, so drift detection and repair live here

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::Result;
use crate::embeddings::EmbeddingProvider;
use crate::storage::metadata::Database;
use crate::storage::vector::{SharedVectorIndex, persistence};

/// Drift report between the metadata store and the vector index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of chunk rows in the metadata store.
    pub metadata_chunks: usize,
    /// Number of live vectors in the index.
    pub live_vectors: usize,
    /// Embedding ids with metadata but no live vector.
    pub missing_in_index: Vec<String>,
    /// Live vector ids with no metadata row.
    pub orphaned_in_index: Vec<String>,
    pub is_consistent: bool,
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Stores are consistent: {} chunks, {} live vectors",
                self.metadata_chunks, self.live_vectors
            )
        } else {
            format!(
                "Drift detected: {} ids missing from the index, {} orphaned in the index",
                self.missing_in_index.len(),
                self.orphaned_in_index.len()
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_index.len() + self.orphaned_in_index.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildOutcome {
    /// Live entries in the rebuilt index.
    pub entries: usize,
    /// Entries whose cached vector was reused from the old backing store.
    pub reused_vectors: usize,
    /// Entries whose content had to be re-embedded.
    pub reembedded: usize,
    /// Physical slots discarded by the rebuild.
    pub purged_slots: usize,
}

/// Performs drift detection and index reconstruction.
pub struct ConsistencyChecker<'a> {
    database: &'a Database,
    index: &'a SharedVectorIndex,
    embedder: &'a Arc<dyn EmbeddingProvider>,
}

impl<'a> ConsistencyChecker<'a> {
    #[inline]
    pub fn new(
        database: &'a Database,
        index: &'a SharedVectorIndex,
        embedder: &'a Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
        }
    }

    /// Compare embedding ids on both sides and report the difference.
    #[inline]
    pub async fn validate(&self) -> Result<ConsistencyReport> {
        info!("Starting cross-store consistency validation");

        let chunks = self
            .database
            .list_all_chunks()
            .await
            .context("Failed to list chunks for consistency check")?;

        let metadata_ids: HashSet<String> =
            chunks.iter().map(|c| c.embedding_id.clone()).collect();

        let live_ids: HashSet<String> = {
            let index = self.index.read().await;
            index.live_ids().into_iter().collect()
        };

        let mut missing_in_index: Vec<String> =
            metadata_ids.difference(&live_ids).cloned().collect();
        let mut orphaned_in_index: Vec<String> =
            live_ids.difference(&metadata_ids).cloned().collect();
        missing_in_index.sort();
        orphaned_in_index.sort();

        let is_consistent = missing_in_index.is_empty() && orphaned_in_index.is_empty();

        let report = ConsistencyReport {
            metadata_chunks: chunks.len(),
            live_vectors: live_ids.len(),
            missing_in_index,
            orphaned_in_index,
            is_consistent,
        };

        if report.is_consistent {
            info!("Consistency validation passed");
        } else {
            warn!("{}", report.summary());
        }

        Ok(report)
    }

    /// Reconstruct the index from the metadata store and persist the pair.
    ///
    /// Vectors still cached in the old backing store are reused; content is
    /// re-embedded only when no cached vector is available. Holds the write
    /// guard for the whole reconstruction, so searches see either the old
    /// or the new index, never a half-built one.
    #[inline]
    pub async fn rebuild(&self, vector_dir: &Path) -> Result<RebuildOutcome> {
        let chunks = self
            .database
            .list_all_chunks()
            .await
            .context("Failed to list chunks for rebuild")?;

        let mut index = self.index.write().await;
        let slots_before = index.slot_count();

        let mut entries = Vec::with_capacity(chunks.len());
        let mut reused_vectors = 0;
        let mut reembedded = 0;

        for chunk in &chunks {
            let vector = match index.vector_for(&chunk.embedding_id) {
                Some(vector) => {
                    reused_vectors += 1;
                    vector.to_vec()
                }
                None => {
                    debug!("Re-embedding chunk {} during rebuild", chunk.chunk_id);
                    reembedded += 1;
                    self.embedder.embed(&chunk.content)?
                }
            };
            entries.push((chunk.embedding_id.clone(), vector));
        }

        let entry_count = entries.len();
        index.rebuild(entries)?;
        persistence::save(&index, vector_dir)?;

        let outcome = RebuildOutcome {
            entries: entry_count,
            reused_vectors,
            reembedded,
            purged_slots: slots_before.saturating_sub(reused_vectors),
        };

        info!(
            "Rebuilt index: {} entries ({} reused, {} re-embedded), {} slots purged",
            outcome.entries, outcome.reused_vectors, outcome.reembedded, outcome.purged_slots
        );

        Ok(outcome)
    }
}

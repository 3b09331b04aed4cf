// Embeddings module
// This module handles the embedding provider boundary and content chunking

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, TextChunk, chunk_text, estimate_token_count, split_text};
pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaClient};

use crate::Result;

/// Boundary to the embedding-generation service.
///
/// Implementations must return vectors of a single fixed dimension for the
/// lifetime of an index; changing the dimension requires a rebuild against
/// a freshly-dimensioned index.
pub trait EmbeddingProvider: Send + Sync {
    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Generate an embedding for a single non-empty text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts. Empty inputs yield `None`
    /// in the matching output slot; positions are never shifted.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Ok(None)
                } else {
                    self.embed(text).map(Some)
                }
            })
            .collect()
    }
}

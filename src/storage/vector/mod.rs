#[cfg(test)]
mod tests;

pub mod persistence;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{Result, VaultError};

/// Shared handle to the vector index: searches take read guards and run
/// concurrently, mutations and their paired persistence writes take the
/// single write guard.
pub type SharedVectorIndex = Arc<RwLock<VectorIndex>>;

/// A similarity-search candidate: a live embedding id, its cosine score
/// against the query, and the physical slot it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub id: String,
    pub score: f32,
    pub slot: usize,
}

/// Exact inner-product index over L2-normalized fixed-dimension vectors.
///
/// The backing store is append-only: `delete` only severs the id-to-slot
/// mapping, the vector data stays in its slot until `rebuild` reconstructs
/// the store from a set of live entries. Search never returns a
/// logically-deleted id even though its vector is still physically present.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<f32>,
    slot_ids: Vec<Option<String>>,
    id_to_slot: HashMap<String, usize>,
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VaultError::Config(
                "Vector dimension must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            vectors: Vec::new(),
            slot_ids: Vec::new(),
            id_to_slot: HashMap::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of live (searchable) entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.id_to_slot.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id_to_slot.is_empty()
    }

    /// Number of physical slots, including logically-deleted ones.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_ids.len()
    }

    /// Number of slots whose vector persists but is no longer addressable.
    #[inline]
    pub fn deleted_count(&self) -> usize {
        self.slot_ids.len() - self.id_to_slot.len()
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.id_to_slot.contains_key(id)
    }

    /// L2-normalize and append a vector, recording the id-to-slot mapping.
    ///
    /// Rejected before any mutation: a vector of the wrong dimension
    /// (`DimensionMismatch`) or an id that already has a live mapping
    /// (`DuplicateId` - callers must delete first to replace).
    #[inline]
    pub fn add(&mut self, id: &str, vector: &[f32]) -> Result<usize> {
        self.check_dimension(vector)?;

        if self.id_to_slot.contains_key(id) {
            return Err(VaultError::DuplicateId(id.to_string()));
        }

        let slot = self.slot_ids.len();
        self.vectors.extend(normalized(vector));
        self.slot_ids.push(Some(id.to_string()));
        self.id_to_slot.insert(id.to_string(), slot);

        debug!("Added vector {} at slot {}", id, slot);
        Ok(slot)
    }

    /// Inner-product search over all live vectors; with both sides
    /// L2-normalized this equals cosine similarity.
    ///
    /// Returns up to `k` matches with `score >= threshold`, ordered by
    /// descending score; ties resolve to the earlier slot so results are
    /// deterministic across runs.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<Vec<SearchMatch>> {
        self.check_dimension(query)?;

        if k == 0 || self.id_to_slot.is_empty() {
            return Ok(Vec::new());
        }

        let query = normalized(query);
        let mut matches = Vec::new();

        for (slot, slot_id) in self.slot_ids.iter().enumerate() {
            let Some(id) = slot_id else {
                // Logically deleted: the vector is still here, the id is not.
                continue;
            };

            let offset = slot * self.dimension;
            let score = dot(&query, &self.vectors[offset..offset + self.dimension]);

            if score >= threshold {
                matches.push(SearchMatch {
                    id: id.clone(),
                    score,
                    slot,
                });
            }
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.slot.cmp(&b.slot))
        });
        matches.truncate(k);

        Ok(matches)
    }

    /// Logical delete: removes the id-to-slot mapping only. The slot's
    /// vector remains physically present until a `rebuild`.
    #[inline]
    pub fn delete(&mut self, id: &str) -> bool {
        match self.id_to_slot.remove(id) {
            Some(slot) => {
                self.slot_ids[slot] = None;
                debug!("Logically deleted vector {} (slot {})", id, slot);
                true
            }
            None => false,
        }
    }

    /// Discard the backing store and reconstruct it from exactly the given
    /// entries, reassigning slots in sequence order. The only way to
    /// reclaim space from logically-deleted slots.
    ///
    /// Every entry is validated before the store is touched; a failed
    /// rebuild leaves the index unchanged.
    #[inline]
    pub fn rebuild(&mut self, entries: Vec<(String, Vec<f32>)>) -> Result<()> {
        let mut vectors = Vec::with_capacity(entries.len() * self.dimension);
        let mut slot_ids = Vec::with_capacity(entries.len());
        let mut id_to_slot = HashMap::with_capacity(entries.len());

        for (slot, (id, vector)) in entries.into_iter().enumerate() {
            self.check_dimension(&vector)?;
            if id_to_slot.contains_key(&id) {
                return Err(VaultError::DuplicateId(id));
            }
            vectors.extend(normalized(&vector));
            id_to_slot.insert(id.clone(), slot);
            slot_ids.push(Some(id));
        }

        self.vectors = vectors;
        self.slot_ids = slot_ids;
        self.id_to_slot = id_to_slot;

        info!("Rebuilt vector index with {} live entries", self.len());
        Ok(())
    }

    /// The stored (normalized) vector for a live id.
    #[inline]
    pub fn vector_for(&self, id: &str) -> Option<&[f32]> {
        self.id_to_slot.get(id).map(|&slot| {
            let offset = slot * self.dimension;
            &self.vectors[offset..offset + self.dimension]
        })
    }

    /// Live ids in slot order.
    #[inline]
    pub fn live_ids(&self) -> Vec<String> {
        self.slot_ids.iter().flatten().cloned().collect()
    }

    /// Live (id, vector) pairs in slot order.
    #[inline]
    pub fn iter_live(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.slot_ids
            .iter()
            .enumerate()
            .filter_map(move |(slot, slot_id)| {
                slot_id.as_deref().map(|id| {
                    let offset = slot * self.dimension;
                    (id, &self.vectors[offset..offset + self.dimension])
                })
            })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VaultError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn raw_parts(&self) -> (&[f32], &[Option<String>]) {
        (&self.vectors, &self.slot_ids)
    }

    pub(crate) fn from_raw_parts(
        dimension: usize,
        vectors: Vec<f32>,
        slot_ids: Vec<Option<String>>,
    ) -> Result<Self> {
        if dimension == 0 || vectors.len() != slot_ids.len() * dimension {
            return Err(VaultError::IndexCorrupt(
                "Backing store length does not match the slot table".to_string(),
            ));
        }

        let mut id_to_slot = HashMap::new();
        for (slot, slot_id) in slot_ids.iter().enumerate() {
            if let Some(id) = slot_id {
                if id_to_slot.insert(id.clone(), slot).is_some() {
                    return Err(VaultError::IndexCorrupt(format!(
                        "Embedding id {id} is mapped to multiple slots"
                    )));
                }
            }
        }

        Ok(Self {
            dimension,
            vectors,
            slot_ids,
            id_to_slot,
        })
    }
}

fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

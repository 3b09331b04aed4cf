// On-disk form of the vector index: two paired artifacts that are always
// written and read together. A missing or mismatched pair is fatal.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::VectorIndex;
use crate::{Result, VaultError};

/// Binary backing-store artifact.
pub const VECTORS_FILE: &str = "vectors.bin";
/// JSON id-to-slot map artifact.
pub const ID_MAP_FILE: &str = "idmap.json";

const VECTORS_MAGIC: &[u8; 4] = b"DVLT";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Serialize, Deserialize)]
struct IdMapFile {
    version: u32,
    dimension: usize,
    slots: Vec<Option<String>>,
}

/// Persist both artifacts, each via write-to-temp-then-rename so a crash
/// mid-write never leaves a readable but inconsistent pair. The id map is
/// renamed last; `load` cross-checks the pair.
pub fn save(index: &VectorIndex, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;

    let (vectors, slot_ids) = index.raw_parts();

    let mut buffer = Vec::with_capacity(HEADER_LEN + vectors.len() * 4);
    buffer.extend_from_slice(VECTORS_MAGIC);
    buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buffer.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    buffer.extend_from_slice(&(slot_ids.len() as u64).to_le_bytes());
    for value in vectors {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    write_atomic(&dir.join(VECTORS_FILE), &buffer)?;

    let map = IdMapFile {
        version: FORMAT_VERSION,
        dimension: index.dimension(),
        slots: slot_ids.to_vec(),
    };
    let json = serde_json::to_vec(&map)
        .map_err(|e| VaultError::Database(format!("Failed to serialize id map: {e}")))?;
    write_atomic(&dir.join(ID_MAP_FILE), &json)?;

    debug!(
        "Persisted {} slots ({} live) to {}",
        index.slot_count(),
        index.len(),
        dir.display()
    );
    Ok(())
}

/// Load the paired artifacts from `dir`.
///
/// Returns `Ok(None)` when neither file exists (a fresh index). Exactly one
/// file present, an unreadable header, or a pair disagreeing on dimension
/// or slot count is an `IndexCorrupt` error - never silently recovered. An
/// index persisted with a different dimension than `expected_dimension`
/// fails with `DimensionMismatch` and requires a rebuild.
pub fn load(dir: &Path, expected_dimension: usize) -> Result<Option<VectorIndex>> {
    let vectors_path = dir.join(VECTORS_FILE);
    let map_path = dir.join(ID_MAP_FILE);

    match (vectors_path.exists(), map_path.exists()) {
        (false, false) => return Ok(None),
        (true, true) => {}
        (true, false) => {
            return Err(VaultError::IndexCorrupt(format!(
                "{VECTORS_FILE} present without {ID_MAP_FILE}"
            )));
        }
        (false, true) => {
            return Err(VaultError::IndexCorrupt(format!(
                "{ID_MAP_FILE} present without {VECTORS_FILE}"
            )));
        }
    }

    let bytes = fs::read(&vectors_path)?;
    if bytes.len() < HEADER_LEN {
        return Err(VaultError::IndexCorrupt(format!(
            "{VECTORS_FILE} is truncated"
        )));
    }
    if &bytes[..4] != VECTORS_MAGIC {
        return Err(VaultError::IndexCorrupt(format!(
            "{VECTORS_FILE} has an unrecognized header"
        )));
    }

    let version = read_u32(&bytes, 4)?;
    if version != FORMAT_VERSION {
        return Err(VaultError::IndexCorrupt(format!(
            "Unsupported backing store format version {version}"
        )));
    }

    let dimension = read_u32(&bytes, 8)? as usize;
    let slot_count = read_u64(&bytes, 12)? as usize;

    let expected_len = slot_count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| {
            VaultError::IndexCorrupt(format!("{VECTORS_FILE} header promises an implausible size"))
        })?;
    if bytes.len() != expected_len {
        return Err(VaultError::IndexCorrupt(format!(
            "{VECTORS_FILE} holds {} bytes, header promises {expected_len}",
            bytes.len()
        )));
    }

    let mut vectors = Vec::with_capacity(slot_count * dimension);
    for chunk in bytes[HEADER_LEN..].chunks_exact(4) {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(chunk);
        vectors.push(f32::from_le_bytes(raw));
    }

    let map_bytes = fs::read(&map_path)?;
    let map: IdMapFile = serde_json::from_slice(&map_bytes)
        .map_err(|e| VaultError::IndexCorrupt(format!("Unreadable id map: {e}")))?;

    if map.version != FORMAT_VERSION {
        return Err(VaultError::IndexCorrupt(format!(
            "Unsupported id map format version {}",
            map.version
        )));
    }
    if map.dimension != dimension {
        return Err(VaultError::IndexCorrupt(format!(
            "Pair disagrees on dimension: backing store {dimension}, id map {}",
            map.dimension
        )));
    }
    if map.slots.len() != slot_count {
        return Err(VaultError::IndexCorrupt(format!(
            "Pair disagrees on slot count: backing store {slot_count}, id map {}",
            map.slots.len()
        )));
    }

    if dimension != expected_dimension {
        return Err(VaultError::DimensionMismatch {
            expected: expected_dimension,
            actual: dimension,
        });
    }

    let index = VectorIndex::from_raw_parts(dimension, vectors, map.slots)?;
    info!(
        "Loaded vector index from {}: {} slots, {} live",
        dir.display(),
        index.slot_count(),
        index.len()
    );
    Ok(Some(index))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let raw: [u8; 4] = bytes
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| VaultError::IndexCorrupt(format!("{VECTORS_FILE} is truncated")))?;
    Ok(u32::from_le_bytes(raw))
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| VaultError::IndexCorrupt(format!("{VECTORS_FILE} is truncated")))?;
    Ok(u64::from_le_bytes(raw))
}

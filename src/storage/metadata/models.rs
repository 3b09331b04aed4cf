use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A logical document owning an ordered sequence of chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub file_id: String,
    pub name: String,
    pub path: String,
    pub file_type: String,
    pub category: String,
    pub summary: Option<String>,
    /// JSON array stored as TEXT; see [`FileRecord::tag_list`].
    pub tags: String,
    pub size: i64,
    pub added_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub processed: bool,
}

impl FileRecord {
    #[inline]
    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub file_id: String,
    pub name: String,
    pub path: String,
    pub file_type: String,
    pub category: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub size: i64,
}

impl NewFileRecord {
    pub(crate) fn tags_json(&self) -> String {
        serde_json::to_string(&self.tags).unwrap_or_else(|_| "[]".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub processed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChunkRecord {
    pub id: i64,
    pub chunk_id: String,
    pub file_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub char_count: i64,
    pub token_count: i64,
    /// Join key into the vector index; equals `chunk_id`.
    pub embedding_id: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChunkRecord {
    pub chunk_id: String,
    pub file_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub char_count: i64,
    pub token_count: i64,
    pub embedding_id: String,
}

/// One page of files plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq)]
pub struct FileListing {
    pub files: Vec<FileRecord>,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileFilter {
    pub category: Option<String>,
    /// Substring match over file name and summary.
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryStatistics {
    pub total_files: i64,
    pub processed_files: i64,
    pub total_chunks: i64,
    /// (category, file count), most populous first.
    pub files_per_category: Vec<(String, i64)>,
}

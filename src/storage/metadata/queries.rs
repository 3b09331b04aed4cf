use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::models::{
    ChunkRecord, FileFilter, FileListing, FileRecord, FileUpdate, LibraryStatistics,
    NewChunkRecord, NewFileRecord,
};

pub struct FileQueries;

impl FileQueries {
    /// Insert a file record, or leave an existing row untouched so that a
    /// resumed ingestion converges on the same record.
    #[inline]
    pub async fn create(pool: &SqlitePool, new_file: NewFileRecord) -> Result<FileRecord> {
        let now = Utc::now().naive_utc();
        let tags = new_file.tags_json();

        sqlx::query(
            "INSERT INTO files (file_id, name, path, file_type, category, summary, tags, size, added_at, processed) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE) \
             ON CONFLICT(file_id) DO NOTHING",
        )
        .bind(&new_file.file_id)
        .bind(&new_file.name)
        .bind(&new_file.path)
        .bind(&new_file.file_type)
        .bind(&new_file.category)
        .bind(&new_file.summary)
        .bind(&tags)
        .bind(new_file.size)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create file record")?;

        Self::get_by_file_id(pool, &new_file.file_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created file record"))
    }

    #[inline]
    pub async fn get_by_file_id(pool: &SqlitePool, file_id: &str) -> Result<Option<FileRecord>> {
        let result = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(pool)
            .await
            .context("Failed to get file by id")?;

        Ok(result)
    }

    /// Paginated listing with optional category and name/summary filters.
    #[inline]
    pub async fn list(
        pool: &SqlitePool,
        page: u32,
        limit: u32,
        filter: &FileFilter,
    ) -> Result<FileListing> {
        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(category) = &filter.category {
            conditions.push("category = ?");
            params.push(category.clone());
        }

        if let Some(search) = &filter.search {
            conditions.push("(name LIKE ? OR summary LIKE ?)");
            let pattern = format!("%{search}%");
            params.push(pattern.clone());
            params.push(pattern);
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM files{where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total_count = count_query
            .fetch_one(pool)
            .await
            .context("Failed to count files")?;

        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(limit);
        let list_sql =
            format!("SELECT * FROM files{where_clause} ORDER BY added_at DESC LIMIT ? OFFSET ?");
        let mut list_query = sqlx::query_as::<_, FileRecord>(&list_sql);
        for param in &params {
            list_query = list_query.bind(param);
        }
        let files = list_query
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(pool)
            .await
            .context("Failed to list files")?;

        Ok(FileListing { files, total_count })
    }

    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        file_id: &str,
        update: FileUpdate,
    ) -> Result<Option<FileRecord>> {
        let mut query_parts = Vec::new();
        let mut query_values = Vec::new();

        if let Some(name) = update.name {
            query_parts.push("name = ?");
            query_values.push(name);
        }

        if let Some(category) = update.category {
            query_parts.push("category = ?");
            query_values.push(category);
        }

        if let Some(summary) = update.summary {
            query_parts.push("summary = ?");
            query_values.push(summary);
        }

        if let Some(tags) = update.tags {
            query_parts.push("tags = ?");
            query_values.push(serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string()));
        }

        if let Some(processed) = update.processed {
            query_parts.push("processed = ?");
            query_values.push(if processed { "1" } else { "0" }.to_string());
        }

        if query_parts.is_empty() {
            return Self::get_by_file_id(pool, file_id).await;
        }

        query_parts.push("updated_at = ?");
        query_values.push(Utc::now().naive_utc().to_string());

        let query_str = format!("UPDATE files SET {} WHERE file_id = ?", query_parts.join(", "));

        let mut query = sqlx::query(&query_str);
        for value in query_values {
            query = query.bind(value);
        }
        query = query.bind(file_id);

        query.execute(pool).await.context("Failed to update file")?;

        Self::get_by_file_id(pool, file_id).await
    }

    /// Transactional cascade: the file row and all its chunk rows are
    /// removed together, or not at all.
    #[inline]
    pub async fn delete(pool: &SqlitePool, file_id: &str) -> Result<bool> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for file delete")?;

        let chunks_deleted = sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *transaction)
            .await
            .context("Failed to delete chunks for file")?
            .rows_affected();

        let files_deleted = sqlx::query("DELETE FROM files WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *transaction)
            .await
            .context("Failed to delete file")?
            .rows_affected();

        transaction
            .commit()
            .await
            .context("Failed to commit file delete transaction")?;

        if files_deleted > 0 {
            debug!("Deleted file {} and {} chunks", file_id, chunks_deleted);
        } else {
            warn!("File {} not found for deletion", file_id);
        }

        Ok(files_deleted > 0)
    }

    #[inline]
    pub async fn statistics(pool: &SqlitePool) -> Result<LibraryStatistics> {
        let total_files = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files")
            .fetch_one(pool)
            .await
            .context("Failed to count files")?;

        let processed_files =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files WHERE processed")
                .fetch_one(pool)
                .await
                .context("Failed to count processed files")?;

        let total_chunks = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")?;

        let files_per_category = sqlx::query_as::<_, (String, i64)>(
            "SELECT category, COUNT(*) FROM files GROUP BY category ORDER BY COUNT(*) DESC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to count files per category")?;

        Ok(LibraryStatistics {
            total_files,
            processed_files,
            total_chunks,
            files_per_category,
        })
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    /// Insert a batch of chunk records in one transaction. Rows whose
    /// `chunk_id` already exists are ignored, so a resumed ingestion with
    /// deterministic ids converges instead of failing.
    #[inline]
    pub async fn create_batch(pool: &SqlitePool, chunks: Vec<NewChunkRecord>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for batch chunk insert")?;

        let now = Utc::now().naive_utc();
        let mut inserted = 0usize;

        for chunk in &chunks {
            let result = sqlx::query(
                "INSERT INTO chunks (chunk_id, file_id, chunk_index, content, char_count, token_count, embedding_id, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(chunk_id) DO NOTHING",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.file_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.char_count)
            .bind(chunk.token_count)
            .bind(&chunk.embedding_id)
            .bind(now)
            .execute(&mut *transaction)
            .await
            .context("Failed to create chunk in batch")?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        transaction
            .commit()
            .await
            .context("Failed to commit batch chunk insert transaction")?;

        debug!("Inserted {} of {} chunk records", inserted, chunks.len());
        Ok(inserted)
    }

    #[inline]
    pub async fn get_by_chunk_id(pool: &SqlitePool, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let result = sqlx::query_as::<_, ChunkRecord>("SELECT * FROM chunks WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(pool)
            .await
            .context("Failed to get chunk by id")?;

        Ok(result)
    }

    /// The retrieval join: resolve an index candidate to its chunk row.
    /// Backed by the index on `embedding_id`.
    #[inline]
    pub async fn get_by_embedding_id(
        pool: &SqlitePool,
        embedding_id: &str,
    ) -> Result<Option<ChunkRecord>> {
        let result =
            sqlx::query_as::<_, ChunkRecord>("SELECT * FROM chunks WHERE embedding_id = ?")
                .bind(embedding_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get chunk by embedding id")?;

        Ok(result)
    }

    /// The context-stitching lookup: a file's chunk at a given position.
    #[inline]
    pub async fn get_by_index(
        pool: &SqlitePool,
        file_id: &str,
        chunk_index: i64,
    ) -> Result<Option<ChunkRecord>> {
        let result = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE file_id = ? AND chunk_index = ?",
        )
        .bind(file_id)
        .bind(chunk_index)
        .fetch_optional(pool)
        .await
        .context("Failed to get chunk by file and index")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_by_file(pool: &SqlitePool, file_id: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE file_id = ? ORDER BY chunk_index",
        )
        .bind(file_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chunks by file")?;

        Ok(chunks)
    }

    /// Every chunk row, ordered by file then position. The rebuild path
    /// relies on this ordering for stable slot assignment.
    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks ORDER BY file_id, chunk_index",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list all chunks")?;

        Ok(chunks)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")?;

        Ok(count)
    }

    #[inline]
    pub async fn count_by_file(pool: &SqlitePool, file_id: &str) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks WHERE file_id = ?")
                .bind(file_id)
                .fetch_one(pool)
                .await
                .context("Failed to count chunks by file")?;

        Ok(count)
    }
}

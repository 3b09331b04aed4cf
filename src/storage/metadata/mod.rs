use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::storage::metadata::models::{
    ChunkRecord, FileFilter, FileListing, FileRecord, FileUpdate, LibraryStatistics,
    NewChunkRecord, NewFileRecord,
};
use crate::storage::metadata::queries::{ChunkQueries, FileQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Transactional store for file and chunk metadata.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/storage/metadata/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_base_dir(base_dir: &Path) -> Result<Self> {
        let db_path = base_dir.join("metadata.db");

        std::fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create base directory: {}", base_dir.display()))?;

        Self::new(&db_path).await
    }

    // File operations
    #[inline]
    pub async fn insert_file(&self, file: &NewFileRecord) -> Result<FileRecord> {
        FileQueries::create(&self.pool, file.clone()).await
    }

    #[inline]
    pub async fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>> {
        FileQueries::get_by_file_id(&self.pool, file_id).await
    }

    #[inline]
    pub async fn list_files(
        &self,
        page: u32,
        limit: u32,
        filter: &FileFilter,
    ) -> Result<FileListing> {
        FileQueries::list(&self.pool, page, limit, filter).await
    }

    #[inline]
    pub async fn update_file(
        &self,
        file_id: &str,
        update: FileUpdate,
    ) -> Result<Option<FileRecord>> {
        FileQueries::update(&self.pool, file_id, update).await
    }

    #[inline]
    pub async fn delete_file(&self, file_id: &str) -> Result<bool> {
        FileQueries::delete(&self.pool, file_id).await
    }

    #[inline]
    pub async fn statistics(&self) -> Result<LibraryStatistics> {
        FileQueries::statistics(&self.pool).await
    }

    // Chunk operations
    #[inline]
    pub async fn insert_chunks(&self, chunks: Vec<NewChunkRecord>) -> Result<usize> {
        ChunkQueries::create_batch(&self.pool, chunks).await
    }

    #[inline]
    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        ChunkQueries::get_by_chunk_id(&self.pool, chunk_id).await
    }

    #[inline]
    pub async fn get_chunk_by_embedding_id(
        &self,
        embedding_id: &str,
    ) -> Result<Option<ChunkRecord>> {
        ChunkQueries::get_by_embedding_id(&self.pool, embedding_id).await
    }

    #[inline]
    pub async fn get_chunk_by_index(
        &self,
        file_id: &str,
        chunk_index: i64,
    ) -> Result<Option<ChunkRecord>> {
        ChunkQueries::get_by_index(&self.pool, file_id, chunk_index).await
    }

    #[inline]
    pub async fn get_chunks_for_file(&self, file_id: &str) -> Result<Vec<ChunkRecord>> {
        ChunkQueries::list_by_file(&self.pool, file_id).await
    }

    #[inline]
    pub async fn list_all_chunks(&self) -> Result<Vec<ChunkRecord>> {
        ChunkQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn count_chunks(&self) -> Result<i64> {
        ChunkQueries::count(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}

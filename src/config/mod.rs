
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

const CONFIG_FILE: &str = "config.toml";

/// On-disk configuration anchoring all durable artifacts under one base
/// directory: `config.toml`, `metadata.db`, and the `vectors/` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Whole-request timeout for a single document ingest, in seconds.
    /// Zero disables the timeout.
    pub timeout_secs: u64,
    /// Upper bound on files ingested concurrently in a batch.
    pub max_concurrent_files: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            max_concurrent_files: 4,
        }
    }
}

impl IngestConfig {
    /// The timeout as a `Duration`, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No platform data directory available for the default base dir")]
    NoDataDir,
    #[error("Invalid embedding endpoint {0}")]
    InvalidUrl(String),
    #[error("Port must be non-zero")]
    InvalidPort,
    #[error("Batch size {0} out of range 1..=1000")]
    InvalidBatchSize(u32),
    #[error("Model name cannot be empty")]
    InvalidModel,
    #[error("Protocol {0:?} is not supported (use http or https)")]
    InvalidProtocol(String),
    #[error("Embedding dimension {0} out of range 64..=4096")]
    InvalidEmbeddingDimension(u32),
    #[error("Max chunk length {0} out of range 64..=8192 characters")]
    InvalidMaxChunkChars(usize),
    #[error("Concurrent file limit {0} out of range 1..=32")]
    InvalidConcurrency(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load the configuration stored under `base_dir`. A missing config
    /// file is not an error: defaults apply until the first `save`.
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Could not read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Could not parse {}", config_path.display()))?
        } else {
            Config {
                ollama: OllamaConfig::default(),
                chunking: ChunkingConfig::default(),
                ingest: IngestConfig::default(),
                base_dir: PathBuf::new(),
            }
        };
        config.base_dir = base_dir;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Load from the platform data directory (`<data_local_dir>/docvault`).
    #[inline]
    pub fn load_default() -> Result<Self> {
        let base_dir = dirs::data_local_dir()
            .ok_or(ConfigError::NoDataDir)?
            .join("docvault");
        Self::load(base_dir)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate().context("Refusing to save invalid configuration")?;

        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("Could not create {}", self.base_dir.display()))?;

        let rendered = toml::to_string_pretty(self).context("Could not serialize configuration")?;
        let config_path = self.base_dir.join(CONFIG_FILE);
        fs::write(&config_path, rendered)
            .with_context(|| format!("Could not write {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;

        if !(64..=8192).contains(&self.chunking.max_chunk_chars) {
            return Err(ConfigError::InvalidMaxChunkChars(
                self.chunking.max_chunk_chars,
            ));
        }

        if !(1..=32).contains(&self.ingest.max_concurrent_files) {
            return Err(ConfigError::InvalidConcurrency(
                self.ingest.max_concurrent_files,
            ));
        }

        Ok(())
    }

    /// Path of the SQLite metadata store.
    #[inline]
    pub fn metadata_db_path(&self) -> PathBuf {
        self.base_dir.join("metadata.db")
    }

    /// Directory holding the paired vector index artifacts.
    #[inline]
    pub fn vector_dir_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel);
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        self.ollama_url().map(|_| ())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let raw = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(raw))
    }
}

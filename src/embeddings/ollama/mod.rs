
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::embeddings::EmbeddingProvider;
use crate::{Result, VaultError};

/// Dimension of nomic-embed-text, the default embedding model.
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// HTTP client for the Ollama embedding API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    dimension: usize,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| VaultError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            dimension: config.embedding_dimension as usize,
            batch_size: config.batch_size,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Check that the Ollama server answers at all.
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.fetch_text("/api/tags", "ping").map(|_| ())
    }

    /// List the models the server has pulled.
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let body = self.fetch_text("/api/tags", "list models")?;
        let parsed: ModelsResponse = parse_body(&body, "models response")?;
        debug!("Ollama reports {} models", parsed.models.len());
        Ok(parsed.models)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| VaultError::Config(format!("Bad Ollama endpoint {path}: {e}")))
    }

    fn fetch_text(&self, path: &str, operation: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        self.send_with_retry(operation, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        request: &B,
        operation: &str,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_string(request)
            .map_err(|e| VaultError::EmbeddingFailed(format!("{operation}: bad request: {e}")))?;

        let body = self.send_with_retry(operation, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&payload)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        parse_body(&body, operation)
    }

    fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Requesting embedding for {} bytes of text", text.len());

        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };
        let response: EmbedResponse = self.post_json("/api/embed", &request, "embed")?;
        Ok(response.embedding)
    }

    fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.len() == 1 {
            return Ok(vec![self.request_embedding(&texts[0])?]);
        }

        let request = BatchEmbedRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        };
        let response: BatchEmbedResponse = self.post_json("/api/embed", &request, "embed batch")?;

        if response.embeddings.len() != texts.len() {
            return Err(VaultError::EmbeddingFailed(format!(
                "Sent {} texts, got {} embeddings back",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VaultError::EmbeddingFailed(format!(
                "Service returned a {}-dimensional vector, configured for {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    /// Run a request, retrying transient failures with doubling backoff.
    /// Client-side HTTP errors (4xx) fail immediately.
    fn send_with_retry<F>(&self, operation: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 1;

        loop {
            match request_fn() {
                Ok(body) => return Ok(body),
                Err(ureq::Error::StatusCode(status)) if status < 500 => {
                    return Err(VaultError::EmbeddingFailed(format!(
                        "{operation} rejected: HTTP {status}"
                    )));
                }
                Err(e) if is_transient(&e) && attempt < self.retry_attempts => {
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        operation, attempt, self.retry_attempts, e, delay
                    );
                    std::thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    error!("{} failed on attempt {}: {}", operation, attempt, e);
                    return Err(VaultError::EmbeddingFailed(format!("{operation}: {e}")));
                }
            }
        }
    }
}

impl EmbeddingProvider for OllamaClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(VaultError::EmbeddingFailed(
                "Cannot embed empty text".to_string(),
            ));
        }

        let vector = self.request_embedding(text)?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        // Empty inputs keep their `None` slot without ever reaching the
        // service; positions in the output never shift.
        let populated: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(position, text)| (position, text.clone()))
            .collect();

        if populated.is_empty() {
            return Ok(results);
        }

        debug!("Embedding {} texts in batches", populated.len());

        for batch in populated.chunks(self.batch_size as usize) {
            let batch_texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let embeddings = self.request_embeddings(&batch_texts)?;

            for ((position, _), vector) in batch.iter().zip(embeddings) {
                self.check_dimension(&vector)?;
                results[*position] = Some(vector);
            }
        }

        Ok(results)
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| VaultError::EmbeddingFailed(format!("Unreadable {what}: {e}")))
}

fn is_transient(error: &ureq::Error) -> bool {
    matches!(
        error,
        ureq::Error::StatusCode(500..)
            | ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_)
    )
}

//! Model loaders for each configured provider.
//!
//! | Provider | Loader | Model |
//! |----------|--------|-------|
//! | `local` | [`LocalLoader`] | fastembed ONNX model, runs offline after download |
//! | `ollama` | [`OllamaLoader`] | remote `POST /api/embed` on an Ollama server |
//! | `hashed` | [`HashedLoader`] | deterministic FNV-1a feature hashing, no model files |
//! | `disabled` | [`DisabledLoader`] | every load fails |
//!
//! # Retry Strategy
//!
//! The Ollama backend retries transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;

use notebook_rag_core::embedding::mean_pool;
use notebook_rag_core::{Result, RetrievalError};

use super::{EmbeddingModel, ModelLoader};
use crate::config::EmbeddingConfig;

pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";
pub const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";

/// Create the loader for `config.provider`.
///
/// # Errors
///
/// Unknown provider names, and `local` when built without the
/// `local-embeddings` feature.
pub fn create_loader(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledLoader)),
        "hashed" => Ok(Arc::new(HashedLoader::new(config.dims))),
        "ollama" => Ok(Arc::new(OllamaLoader::new(config))),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalLoader::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled ============

/// Loader used when embeddings are turned off. Every load fails, so semantic
/// search reports a model failure instead of returning zero vectors.
pub struct DisabledLoader;

#[async_trait]
impl ModelLoader for DisabledLoader {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        Err(RetrievalError::model_load("embedding provider is disabled"))
    }
}

// ============ Hashed ============

/// Feature-hashing embedder: each token is hashed into one of `dims`
/// buckets and the token vectors are mean-pooled.
///
/// Texts sharing words get positive similarity, which is enough for tests
/// and air-gapped use. Not semantically meaningful beyond word overlap.
pub struct HashedLoader {
    dims: usize,
}

impl HashedLoader {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl ModelLoader for HashedLoader {
    fn model_name(&self) -> &str {
        "hashed"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        if self.dims == 0 {
            return Err(RetrievalError::model_load("hashed embedder needs dims > 0"));
        }
        Ok(Arc::new(HashedModel { dims: self.dims }))
    }
}

pub struct HashedModel {
    dims: usize,
}

impl HashedModel {
    /// FNV-1a bucket for a term.
    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.chars().count() >= 2)
            .map(str::to_lowercase)
            .collect()
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let rows: Vec<Vec<f32>> = Self::tokenize(text)
            .iter()
            .map(|tok| {
                let bucket = Self::bucket(tok, self.dims);
                let mut row = vec![0.0f32; self.dims];
                row[bucket] = 1.0;
                row
            })
            .collect();
        if rows.is_empty() {
            return vec![0.0; self.dims];
        }
        mean_pool(&rows)
    }
}

#[async_trait]
impl EmbeddingModel for HashedModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }
}

// ============ Ollama ============

/// Loader for a model served by Ollama.
///
/// Requires Ollama running with the model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaLoader {
    model: String,
    dims: usize,
    url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaLoader {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            dims: config.dims,
            url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }
}

#[async_trait]
impl ModelLoader for OllamaLoader {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RetrievalError::model_load(format!("failed to build HTTP client: {e}")))?;
        Ok(Arc::new(OllamaModel {
            client,
            model: self.model.clone(),
            endpoint: format!("{}/api/embed", self.url),
            max_retries: self.max_retries,
        }))
    }
}

pub struct OllamaModel {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    max_retries: u32,
}

#[async_trait]
impl EmbeddingModel for OllamaModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RetrievalError::inference(format!("invalid Ollama response: {e}"))
                        })?;
                        let rows = parse_ollama_response(&json)?;
                        return Ok(mean_pool(&rows));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RetrievalError::inference(format!(
                        "Ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.endpoint, e
                    ));
                    continue;
                }
            }
        }

        Err(RetrievalError::inference(
            last_err.unwrap_or_else(|| "Ollama embedding failed after retries".to_string()),
        ))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| RetrievalError::inference("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                RetrievalError::inference("Invalid Ollama response: embedding is not an array")
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    if result.is_empty() {
        return Err(RetrievalError::inference("Invalid Ollama response: no embeddings"));
    }
    Ok(result)
}

// ============ Local (fastembed) ============

/// Loader for a local fastembed model.
///
/// Models are downloaded from Hugging Face on first load and cached; after
/// that, embedding runs entirely offline.
#[cfg(feature = "local-embeddings")]
pub struct LocalLoader {
    model_name: String,
    dims: usize,
    model: fastembed::EmbeddingModel,
}

#[cfg(feature = "local-embeddings")]
impl LocalLoader {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let model = config_to_fastembed_model(&model_name)?;
        let dims = native_dims(&model_name);
        if config.dims != dims {
            bail!(
                "embedding.dims = {} does not match model '{}' ({} dims)",
                config.dims,
                model_name,
                dims
            );
        }
        Ok(Self {
            model_name,
            dims,
            model,
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn native_dims(model_name: &str) -> usize {
    match model_name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl ModelLoader for LocalLoader {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let model = self.model.clone();
        let session = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(false),
            )
        })
        .await
        .map_err(|e| RetrievalError::model_load(format!("model load task failed: {e}")))?
        .map_err(|e| RetrievalError::model_load(format!("failed to initialize local model: {e}")))?;

        Ok(Arc::new(LocalModel {
            session: Arc::new(parking_lot::Mutex::new(session)),
        }))
    }
}

/// fastembed session. Inference needs `&mut`, so calls are serialized.
#[cfg(feature = "local-embeddings")]
pub struct LocalModel {
    session: Arc<parking_lot::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingModel for LocalModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let session = Arc::clone(&self.session);
        let text = text.to_string();
        let rows = tokio::task::spawn_blocking(move || session.lock().embed(vec![text], None))
            .await
            .map_err(|e| RetrievalError::inference(format!("inference task failed: {e}")))?
            .map_err(|e| RetrievalError::inference(format!("local embedding failed: {e}")))?;
        if rows.is_empty() {
            return Err(RetrievalError::inference("local model returned no embedding"));
        }
        Ok(mean_pool(&rows))
    }
}

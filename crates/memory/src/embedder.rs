//! Embedding model loading and the HTTP embedder.
//!
//! The model is process-wide singleton state. [`EmbedderHandle`] wraps it
//! in a single-flight load coordinator: the first caller triggers the
//! load, concurrent callers wait for that load instead of duplicating it,
//! and a failed load is cached so retrieval degrades to empty results
//! instead of hammering a broken endpoint on every call.

use boundless_core::error::MemoryError;
use boundless_core::memory::Embedder;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// A deferred embedder construction.
pub type EmbedderFuture = BoxFuture<'static, Result<Arc<dyn Embedder>, MemoryError>>;

/// Factory invoked exactly once, on first use.
pub type EmbedderFactory = Box<dyn Fn() -> EmbedderFuture + Send + Sync>;

enum LoadState {
    Unloaded,
    Loading,
    Ready(Arc<dyn Embedder>),
    Failed(String),
}

/// Lazy, single-flight handle to the process-wide embedding model.
pub struct EmbedderHandle {
    state: Mutex<LoadState>,
    loaded: Notify,
    factory: EmbedderFactory,
}

impl EmbedderHandle {
    pub fn new(factory: EmbedderFactory) -> Self {
        Self {
            state: Mutex::new(LoadState::Unloaded),
            loaded: Notify::new(),
            factory,
        }
    }

    /// Handle backed by an [`HttpEmbedder`] built on first use.
    pub fn http(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self::new(Box::new(move || {
            let base_url = base_url.clone();
            let api_key = api_key.clone();
            let model = model.clone();
            Box::pin(async move {
                let embedder = HttpEmbedder::connect(base_url, api_key, model).await?;
                Ok(Arc::new(embedder) as Arc<dyn Embedder>)
            })
        }))
    }

    /// Get the loaded embedder, loading it on first use.
    ///
    /// Concurrent first-use callers coalesce into one load. A cached
    /// failure returns immediately without retrying.
    pub async fn get(&self) -> Result<Arc<dyn Embedder>, MemoryError> {
        loop {
            // Register for the wakeup before inspecting state so a load
            // finishing between unlock and await is not missed.
            let notified = self.loaded.notified();

            let should_load = {
                let mut state = self.state.lock().await;
                match &*state {
                    LoadState::Ready(embedder) => return Ok(embedder.clone()),
                    LoadState::Failed(msg) => {
                        return Err(MemoryError::ModelUnavailable(msg.clone()));
                    }
                    LoadState::Loading => false,
                    LoadState::Unloaded => {
                        *state = LoadState::Loading;
                        true
                    }
                }
            };

            if should_load {
                let result = (self.factory)().await;
                let mut state = self.state.lock().await;
                return match result {
                    Ok(embedder) => {
                        debug!(model = embedder.id(), "Embedding model loaded");
                        *state = LoadState::Ready(embedder.clone());
                        self.loaded.notify_waiters();
                        Ok(embedder)
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        warn!(error = %msg, "Embedding model failed to load; caching failure");
                        *state = LoadState::Failed(msg.clone());
                        self.loaded.notify_waiters();
                        Err(MemoryError::ModelUnavailable(msg))
                    }
                };
            }

            notified.await;
        }
    }

    /// Clear a cached load failure so the next use retries.
    /// Driven by explicit user action, never automatically.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        if matches!(&*state, LoadState::Failed(_)) {
            *state = LoadState::Unloaded;
        }
    }
}

/// An embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl HttpEmbedder {
    /// Connect and validate the endpoint with a warmup embedding, which
    /// also fixes the dimensionality for the life of the process.
    pub async fn connect(
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Result<Self, MemoryError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| MemoryError::ModelUnavailable(format!("HTTP client: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let warmup = request_embedding(&client, &base_url, api_key.as_deref(), &model, "warmup")
            .await?;

        debug!(model = %model, dimensions = warmup.len(), "Embedding endpoint validated");
        Ok(Self {
            base_url,
            api_key,
            model,
            dimensions: warmup.len(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    fn id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        request_embedding(
            &self.client,
            &self.base_url,
            self.api_key.as_deref(),
            &self.model,
            text,
        )
        .await
    }
}

async fn request_embedding(
    client: &reqwest::Client,
    base_url: &str,
    api_key: Option<&str>,
    model: &str,
    text: &str,
) -> Result<Vec<f32>, MemoryError> {
    let url = format!("{base_url}/embeddings");
    let body = serde_json::json!({
        "model": model,
        "input": [text],
        "encoding_format": "float",
    });

    let mut request = client.post(&url).json(&body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| MemoryError::EmbeddingFailed(format!("network: {e}")))?;

    let status = response.status().as_u16();
    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        return Err(MemoryError::EmbeddingFailed(format!(
            "embedding endpoint returned {status}: {error_body}"
        )));
    }

    let api_response: EmbeddingApiResponse = response
        .json()
        .await
        .map_err(|e| MemoryError::EmbeddingFailed(format!("parse: {e}")))?;

    api_response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| MemoryError::EmbeddingFailed("no embedding in response".into()))
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

//! Embedding provider clients
//!
//! Provides an `EmbeddingBackend` trait with implementations for:
//! - **HTTP**: any OpenAI-compatible `/v1/embeddings` endpoint
//! - **HTTP-fallback**: the HTTP client with graceful degradation to `Ok(None)`
//!
//! A note stored without a vector simply has no semantic dimension until the
//! backfill worker catches up.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::EmbeddingSettings;

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text. Returns `None` when no vector is available
    /// (fallback mode signalling graceful degradation).
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError>;

    /// Expected vector length.
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },

    #[error("Unknown embedding backend: {0}")]
    UnknownBackend(String),
}

// ============================================================================
// Config types
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl HttpEmbeddingConfig {
    /// Build from the `[embedding]` section, reading the key from the
    /// configured environment variable.
    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());

        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
            timeout_secs: 30,
        }
    }
}

/// Configuration union for the backend factory.
pub enum BackendConfig {
    Http(HttpEmbeddingConfig),
    HttpFallback(HttpEmbeddingConfig),
    Disabled,
}

impl BackendConfig {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, EmbeddingError> {
        match settings.backend.as_str() {
            "http" => Ok(BackendConfig::Http(HttpEmbeddingConfig::from_settings(settings))),
            "http-fallback" => Ok(BackendConfig::HttpFallback(
                HttpEmbeddingConfig::from_settings(settings),
            )),
            "none" => Ok(BackendConfig::Disabled),
            other => Err(EmbeddingError::UnknownBackend(other.to_string())),
        }
    }
}

/// Create the configured backend; `None` when embeddings are disabled.
pub fn create_backend(
    config: BackendConfig,
) -> Result<Option<Box<dyn EmbeddingBackend>>, EmbeddingError> {
    match config {
        BackendConfig::Http(c) => Ok(Some(Box::new(HttpEmbeddingClient::new(c)?))),
        BackendConfig::HttpFallback(c) => Ok(Some(Box::new(FallbackEmbeddingClient::new(c)?))),
        BackendConfig::Disabled => Ok(None),
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ============================================================================
// HttpEmbeddingClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    config: HttpEmbeddingConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Embed with retries (direct call, returns raw Vec)
    pub async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        match Retry::spawn(retry_strategy, || self.embed_once(text)).await {
            Ok(vec) => Ok(vec),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All embedding retry attempts failed"
                );
                Err(EmbeddingError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.config.base_url);
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(body);

            tracing::error!(code = status.as_u16(), message = %message, "Embedding API error");

            return Err(EmbeddingError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let values = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::MissingEmbedding)?;

        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }

        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed_raw(text).await.map(Some)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// FallbackEmbeddingClient
// ============================================================================

/// Wraps `HttpEmbeddingClient`. On any error, logs a warning and returns
/// `Ok(None)` so the note is stored without an embedding vector.
pub struct FallbackEmbeddingClient {
    inner: HttpEmbeddingClient,
}

impl FallbackEmbeddingClient {
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            inner: HttpEmbeddingClient::new(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for FallbackEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        match self.inner.embed_raw(text).await {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Embedding failed, storing note without vector (semantic dimension unavailable)"
                );
                Ok(None)
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "http-fallback"
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Embedding provider client
//!
//! Speaks the common `/embeddings` JSON protocol: `{model, input}` in,
//! `{data: [{embedding, index}], usage}` out. Batched embedding degrades
//! per item: a failed batch is retried item by item with a short pause
//! between attempts, and an item that still fails becomes a zero vector of
//! the expected dimension. The output therefore always lines up 1:1 with the
//! input, even under partial provider failure.
//!
//! The vector dimension is discovered from the first successful response
//! rather than hard-coded, because different embedding models produce
//! different dimensions.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::tokenizer::estimate_embedding_cost;
use crate::RagError;

/// Embedding backend trait
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed many texts, order-preserving and 1:1 with the input
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Vector dimension, once known
    fn dimension(&self) -> Option<usize>;
}

/// Embedder configuration
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// API endpoint base, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// API credential; absence is a fatal configuration error
    pub api_key: Option<String>,
    /// Expected dimension until the provider reveals the real one
    pub dimension: usize,
    /// Items per batch request
    pub batch_size: usize,
    /// Pause between successive batches
    pub batch_delay: Duration,
    /// Pause between per-item retries after a failed batch
    pub retry_delay: Duration,
    /// Provider price per 1K tokens, for logged cost estimates
    pub price_per_1k_tokens: f64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            dimension: 1536,
            batch_size: 50,
            batch_delay: Duration::from_millis(500),
            retry_delay: Duration::from_millis(300),
            price_per_1k_tokens: 0.00002,
        }
    }
}

/// HTTP embedding client
pub struct HttpEmbedder {
    client: Client,
    config: EmbedderConfig,
    /// Discovered vector dimension; 0 until the first successful response
    discovered_dim: AtomicUsize,
}

impl HttpEmbedder {
    /// Create a new embedder
    ///
    /// A missing API key is rejected here rather than on first use, so a
    /// misconfigured deployment fails at startup.
    pub fn new(config: EmbedderConfig) -> Result<Self, RagError> {
        let key_missing = config.api_key.as_deref().unwrap_or("").is_empty();
        if key_missing && !config.endpoint.starts_with("http://localhost") {
            return Err(RagError::Configuration(
                "Embedding API key not set. Set EMBEDDING_API_KEY or DOCCHAT_API_KEY."
                    .to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                RagError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            discovered_dim: AtomicUsize::new(0),
        })
    }

    /// The dimension zero vectors are padded to
    fn expected_dimension(&self) -> usize {
        match self.discovered_dim.load(Ordering::Relaxed) {
            0 => self.config.dimension,
            d => d,
        }
    }

    /// One provider round trip for a slice of texts
    async fn embed_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RagError> {
        let expected = texts.len();
        let request = EmbedRequest {
            model: self.config.model.clone(),
            input: texts,
        };

        let url = format!(
            "{}/embeddings",
            self.config.endpoint.trim_end_matches('/')
        );
        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Provider returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Invalid response: {}", e)))?;

        if parsed.data.len() != expected {
            return Err(RagError::Embedding(format!(
                "Provider returned {} vectors for {} inputs",
                parsed.data.len(),
                expected
            )));
        }

        // The protocol does not promise response order; sort by index.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        if let Some(first) = vectors.first() {
            if !first.is_empty() {
                self.discovered_dim.store(first.len(), Ordering::Relaxed);
            }
        }

        if let Some(usage) = parsed.usage {
            let tokens = usage.total_tokens.unwrap_or(0);
            let cost = usage.cost.unwrap_or_else(|| {
                estimate_embedding_cost(tokens, self.config.price_per_1k_tokens)
            });
            tracing::debug!(tokens, cost, "Embedding usage");
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let vectors = self.embed_request(vec![text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let options = BatchOptions {
            batch_size: self.config.batch_size,
            batch_delay: self.config.batch_delay,
            retry_delay: self.config.retry_delay,
        };
        let result = embed_in_batches(texts, &options, || self.expected_dimension(), |batch| {
            self.embed_request(batch)
        })
        .await;

        if result.failed_items > 0 {
            tracing::warn!(
                failed = result.failed_items,
                total = texts.len(),
                "Some items could not be embedded; stored as zero vectors"
            );
        }

        Ok(result.vectors)
    }

    fn dimension(&self) -> Option<usize> {
        match self.discovered_dim.load(Ordering::Relaxed) {
            0 => None,
            d => Some(d),
        }
    }
}

/// Batch orchestration knobs
#[derive(Debug, Clone)]
pub(crate) struct BatchOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub retry_delay: Duration,
}

pub(crate) struct BatchOutcome {
    pub vectors: Vec<Vec<f32>>,
    pub failed_items: usize,
}

/// Batched embedding with per-item degradation
///
/// Invariant: `vectors.len() == texts.len()` whatever the provider does.
/// A failed batch is retried item by item with `retry_delay` spacing to
/// stay under rate limits; an item that still fails becomes a zero vector
/// of `zero_dim()` length. Successive batches are separated by
/// `batch_delay`.
pub(crate) async fn embed_in_batches<D, C, Fut>(
    texts: &[String],
    options: &BatchOptions,
    zero_dim: D,
    call: C,
) -> BatchOutcome
where
    D: Fn() -> usize,
    C: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<Vec<f32>>, RagError>>,
{
    let mut vectors = Vec::with_capacity(texts.len());
    let mut failed_items = 0usize;
    let batch_size = options.batch_size.max(1);

    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        if batch_no > 0 {
            tokio::time::sleep(options.batch_delay).await;
        }

        match call(batch.to_vec()).await {
            Ok(batch_vectors) => vectors.extend(batch_vectors),
            Err(e) => {
                tracing::warn!(
                    batch = batch_no,
                    size = batch.len(),
                    error = %e,
                    "Batch embedding failed, retrying items individually"
                );

                for (i, text) in batch.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(options.retry_delay).await;
                    }
                    match call(vec![text.clone()]).await {
                        Ok(mut single) if !single.is_empty() => {
                            vectors.push(single.remove(0));
                        }
                        Ok(_) | Err(_) => {
                            failed_items += 1;
                            vectors.push(vec![0.0; zero_dim()]);
                        }
                    }
                }
            }
        }
    }

    BatchOutcome {
        vectors,
        failed_items,
    }
}

// Embedding API wire types

/// The provider accepts `input` as a single string or an array; the client
/// always sends the array form
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
    #[serde(default)]
    usage: Option<EmbedUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedUsage {
    #[serde(default)]
    total_tokens: Option<usize>,
    #[serde(default)]
    cost: Option<f64>,
}

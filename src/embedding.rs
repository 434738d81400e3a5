//! Embedding client abstraction and the OpenAI-compatible HTTP
//! implementation.
//!
//! The embedding model itself is opaque: a remote service that turns a
//! batch of texts into equal-length float vectors, order-preserving.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! A batch that exhausts its retries fails the whole call; no partial
//! success is surfaced.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// A service that embeds batches of text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model(&self) -> &str;

    /// Vector dimensionality every response must match.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Build the configured client.
///
/// `provider = "disabled"` fails here rather than at first use, so a
/// misconfigured deployment is caught at startup.
pub fn create_client(
    config: &EmbeddingConfig,
    dimension: usize,
) -> Result<HttpEmbeddingClient, EmbedError> {
    match config.provider.as_str() {
        "openai" => HttpEmbeddingClient::new(config, dimension),
        _ => Err(EmbedError::Disabled),
    }
}

/// OpenAI-compatible `POST {base_url}/embeddings` client.
pub struct HttpEmbeddingClient {
    model: String,
    dimension: usize,
    base_url: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig, dimension: usize) -> Result<Self, EmbedError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EmbedError::MissingCredentials(config.api_key_env.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Network(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            dimension,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dimension,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!("embedding retry {} after {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let payload: EmbeddingResponse = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;
                        return parse_embedding_response(payload, texts.len(), self.dimension);
                    }

                    let message = response.text().await.unwrap_or_default();
                    let err = EmbedError::Service {
                        status: status.as_u16(),
                        message,
                    };
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(EmbedError::Network(e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EmbedError::Network("embedding failed".to_string())))
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!("embedding batch of {} texts", batch.len());
            vectors.extend(self.embed_once(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Restore input order by index and validate count and dimensions.
fn parse_embedding_response(
    payload: EmbeddingResponse,
    expected_count: usize,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if payload.data.len() != expected_count {
        return Err(EmbedError::CountMismatch {
            expected: expected_count,
            actual: payload.data.len(),
        });
    }

    let mut data = payload.data;
    data.sort_by_key(|d| d.index);

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        if item.embedding.len() != expected_dims {
            return Err(EmbedError::DimensionMismatch {
                expected: expected_dims,
                actual: item.embedding.len(),
            });
        }
        vectors.push(item.embedding);
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_restores_input_order() {
        let payload = EmbeddingResponse {
            data: vec![
                EmbeddingData {
                    index: 1,
                    embedding: vec![0.0, 1.0],
                },
                EmbeddingData {
                    index: 0,
                    embedding: vec![1.0, 0.0],
                },
            ],
        };

        let vectors = parse_embedding_response(payload, 2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_rejects_count_mismatch() {
        let payload = EmbeddingResponse {
            data: vec![EmbeddingData {
                index: 0,
                embedding: vec![1.0],
            }],
        };
        let err = parse_embedding_response(payload, 2, 1).unwrap_err();
        assert!(matches!(err, EmbedError::CountMismatch { .. }));
    }

    #[test]
    fn test_parse_rejects_dimension_mismatch() {
        let payload = EmbeddingResponse {
            data: vec![EmbeddingData {
                index: 0,
                embedding: vec![1.0, 2.0, 3.0],
            }],
        };
        let err = parse_embedding_response(payload, 1, 2).unwrap_err();
        assert!(matches!(err, EmbedError::DimensionMismatch { .. }));
    }
}

//! Embedder (C3): batched, order-preserving text embedding against an
//! Ollama-compatible `/api/embed` endpoint, with exponential backoff+jitter
//! retry on transient failures.

use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, Result};
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for the embedding backend. Enforces the process-wide concurrency
/// cap via a shared semaphore (§5); batches are chunked to `config.batch_size`.
pub struct Embedder {
    client: Client,
    config: EmbeddingConfig,
    semaphore: Arc<Semaphore>,
}

impl Embedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_calls));
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build embedding HTTP client");
        Self {
            client,
            config,
            semaphore,
        }
    }

    /// Embeds `texts`, preserving input order. Splits into batches of
    /// `config.batch_size`, retries each batch with exponential backoff on
    /// transient failure, and fails hard (no silent truncation) on any input
    /// exceeding the model's token limit.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            let approx_tokens = text.split_whitespace().count();
            if approx_tokens > self.config.max_input_tokens {
                return Err(EmbeddingError::InputTooLarge {
                    tokens: approx_tokens,
                    limit: self.config.max_input_tokens,
                }
                .into());
            }
        }

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let embeddings = self.embed_batch_with_retry(batch).await?;
            out.extend(embeddings);
        }
        Ok(out)
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("embedding semaphore never closed");

        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();

        let mut attempts = 0u32;
        let max_attempts = self.config.max_retries;

        let result = retry(backoff, || async {
            attempts += 1;
            self.embed_batch_once(batch).await.map_err(|e| {
                if attempts >= max_attempts || !e.is_retryable() {
                    backoff::Error::permanent(e)
                } else {
                    warn!(attempt = attempts, error = %e, "embedding call failed, retrying");
                    backoff::Error::transient(e)
                }
            })
        })
        .await;

        result.map_err(|e| {
            EmbeddingError::RetriesExhausted {
                attempts,
                last_error: e.to_string(),
            }
            .into()
        })
    }

    async fn embed_batch_once(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.config.base_url.trim_end_matches('/'));
        let request = EmbedRequest {
            model: &self.config.model,
            input: batch,
        };

        debug!(batch_size = batch.len(), "requesting embeddings");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if status == 429 {
            return Err(EmbeddingError::RateLimited.into());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RequestFailed(format!("HTTP {status}: {text}")).into());
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.embeddings.len() != batch.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.embeddings.len()
            ))
            .into());
        }

        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversize_input_is_rejected_before_any_call() {
        let config = EmbeddingConfig {
            max_input_tokens: 3,
            ..EmbeddingConfig::default()
        };
        let embedder = Embedder::new(config);
        let texts = vec!["one two three four five".to_string()];
        let result = tokio_test::block_on(embedder.embed(&texts));
        assert!(matches!(
            result.unwrap_err(),
            crate::error::AgentError::Embedding(EmbeddingError::InputTooLarge { .. })
        ));
    }
}

//! Generation client (C9 dependency): an Ollama-compatible chat/generation
//! backend, with `backoff`-based retry for the "retry up to 2x, then fall
//! back to a templated apology" policy of §4.9.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Chat message role, mirroring the teacher's `llm.rs::Role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

/// Generation backend, abstracted behind a trait so the orchestrator and
/// classifier can be tested with a mock implementation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a single completion for `prompt`, retrying per `LlmConfig`.
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;

    /// Generates from a structured message list (system preamble, history,
    /// evidence block, question), as used by the grounded-prompt path.
    async fn chat(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Message,
}

pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build LLM HTTP client");
        Self { client, config }
    }

    async fn with_retry<F, Fut>(&self, op: F) -> Result<String>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<String>>,
    {
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(20)))
            .build();

        let mut attempts = 0u32;
        let max_attempts = self.config.retry_attempts.max(1);

        retry(backoff, || async {
            attempts += 1;
            op().await.map_err(|e| {
                let retryable = matches!(
                    &e,
                    crate::error::AgentError::Llm(LlmError::ConnectionFailed(_))
                        | crate::error::AgentError::Llm(LlmError::RateLimited)
                        | crate::error::AgentError::Llm(LlmError::ServerError(_))
                );
                if attempts >= max_attempts || !retryable {
                    backoff::Error::permanent(e)
                } else {
                    warn!(attempt = attempts, error = %e, "LLM call failed, retrying");
                    backoff::Error::transient(e)
                }
            })
        })
        .await
    }

    async fn generate_once(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        map_status(&response)?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.response)
    }

    async fn chat_once(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
            options: GenerateOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        map_status(&response)?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

fn map_status(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(match status.as_u16() {
        401 => LlmError::Unauthorized,
        404 => LlmError::ModelNotFound(status.to_string()),
        429 => LlmError::RateLimited,
        500..=599 => LlmError::ServerError(status.to_string()),
        _ => LlmError::GenerationFailed(status.to_string()),
    }
    .into())
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        self.with_retry(|| self.generate_once(prompt, temperature, max_tokens))
            .await
    }

    async fn chat(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Result<String> {
        self.with_retry(|| self.chat_once(messages, temperature, max_tokens))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_helper() {
        let m = user_message("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "hello");
    }

    #[test]
    fn test_system_message_helper() {
        let m = system_message("be concise");
        assert_eq!(m.role, Role::System);
    }
}

//! Error handling for the Verdana agent

use thiserror::Error;

/// Result type alias for the agent
pub type Result<T> = std::result::Result<T, AgentError>;

/// Top-level error type returned by every public operation in this crate.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("web search error: {0}")]
    WebSearch(#[from] WebSearchError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("AI consent required")]
    ConsentMissing,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

/// C1 — text extraction failures.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("file unreadable: {0}")]
    Unreadable(String),

    #[error("document is encrypted")]
    Encrypted,

    #[error("document is structurally corrupt: {0}")]
    Corrupt(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("no extractable text (scanned/image-only document)")]
    NoText,
}

/// C3 — embedding failures.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("embedding request failed: {0}")]
    RequestFailed(String),

    #[error("input exceeds model token limit: {tokens} > {limit}")]
    InputTooLarge { tokens: usize, limit: usize },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("exhausted retry budget after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// C4 — vector store failures.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("store not initialized")]
    NotInitialized,

    #[error("embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("search failed: {0}")]
    SearchFailed(String),

    #[error("storage failed: {0}")]
    StorageFailed(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

/// C6 — web search failures. Always recovered locally by the caller (never
/// propagated as a hard failure of the overall query).
#[derive(Error, Debug)]
pub enum WebSearchError {
    #[error("upstream request failed: {0}")]
    RequestFailed(String),

    #[error("upstream returned an error status: {0}")]
    UpstreamStatus(u16),

    #[error("response could not be parsed: {0}")]
    InvalidResponse(String),
}

/// C9 — LLM generation failures.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("all providers failed")]
    AllProvidersFailed,
}

/// C8 — classifier failures. Always falls through to `QueryClass::Policy`.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier LLM call failed: {0}")]
    LlmFailed(String),

    #[error("classifier response was not one of the known classes: {0}")]
    UnknownClass(String),
}

impl AgentError {
    /// Whether retrying the same operation is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Llm(LlmError::ConnectionFailed(_))
                | AgentError::Llm(LlmError::RateLimited)
                | AgentError::Llm(LlmError::ServerError(_))
                | AgentError::Embedding(EmbeddingError::ConnectionFailed(_))
                | AgentError::Embedding(EmbeddingError::RateLimited)
                | AgentError::Http(_)
                | AgentError::Timeout(_)
        )
    }

    /// Error category for logging/metrics fields.
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Extraction(_) => "extraction",
            AgentError::Embedding(_) => "embedding",
            AgentError::VectorStore(_) => "vector_store",
            AgentError::WebSearch(_) => "web_search",
            AgentError::Llm(_) => "llm",
            AgentError::Classifier(_) => "classifier",
            AgentError::Timeout(_) => "timeout",
            AgentError::ConsentMissing => "consent_missing",
            AgentError::Config(_) => "config",
            AgentError::Io(_) => "io",
            AgentError::Serialization(_) => "serialization",
            AgentError::Http(_) => "http",
            AgentError::Database(_) => "database",
            AgentError::NotFound(_) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let rate_limited = AgentError::Llm(LlmError::RateLimited);
        assert!(rate_limited.is_retryable());

        let config_error = AgentError::Config("invalid config".to_string());
        assert!(!config_error.is_retryable());
    }

    #[test]
    fn test_error_category() {
        let llm_error = AgentError::Llm(LlmError::AllProvidersFailed);
        assert_eq!(llm_error.category(), "llm");

        let store_error = AgentError::VectorStore(VectorStoreError::NotInitialized);
        assert_eq!(store_error.category(), "vector_store");
    }

    #[test]
    fn test_consent_missing_not_retryable() {
        assert!(!AgentError::ConsentMissing.is_retryable());
    }
}

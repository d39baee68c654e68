//! Verdana agent
//!
//! A retrieval-augmented Q&A pipeline over an ingested EU Green Deal policy
//! corpus, with web search as a fallback and a bounded conversation memory.
//!
//! # Example
//!
//! ```rust,no_run
//! use verdana_agent::config::AgentConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AgentConfig::default();
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod api;
pub mod chunking;
pub mod classify;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod ingest;
pub mod language;
pub mod llm;
pub mod retrieval;
pub mod session;
pub mod speech;
pub mod store;
pub mod types;
pub mod websearch;

pub use agent::{Agent, AgentContext, AgentResponse, ContentMarker};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use session::ConversationMemory;
pub use store::{SqliteVectorStore, VectorStore};
pub use types::{Chunk, Document, QueryClass, ScoredChunk, SourceRef, Turn};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}

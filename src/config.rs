//! Configuration for the Verdana agent

use serde::{Deserialize, Serialize};

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub store: VectorStoreConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub web_search: WebSearchConfig,
    pub classifier: ClassifierConfig,
    pub session: SessionConfig,
    pub deadlines: DeadlinesConfig,
}

/// Language-model (generation) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama-compatible generation endpoint.
    pub base_url: String,
    /// Model used for response generation.
    pub model: String,
    /// Sampling temperature. Kept low per SPEC_FULL §4.9.
    pub temperature: f32,
    /// Bounded output length.
    pub max_output_tokens: u32,
    /// Retry attempts on transient LLM failure.
    pub retry_attempts: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            temperature: 0.3,
            max_output_tokens: 1000,
            retry_attempts: 2,
        }
    }
}

/// Embedding (C3) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Output dimension. Must equal `VectorStoreConfig::embedding_dim`.
    pub dimension: usize,
    /// Texts per embedding request.
    pub batch_size: usize,
    /// Maximum retry attempts on transient failure.
    pub max_retries: u32,
    /// Token limit per input; oversize inputs are a caller error, never truncated.
    pub max_input_tokens: usize,
    /// Process-wide concurrent embedding call cap.
    pub max_concurrent_calls: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 1536,
            batch_size: 64,
            max_retries: 5,
            max_input_tokens: 8192,
            max_concurrent_calls: 20,
        }
    }
}

/// Vector store (C4) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub database_url: String,
    /// Must match `EmbeddingConfig::dimension`; enforced at startup.
    pub embedding_dim: usize,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:verdana.db".to_string(),
            embedding_dim: 1536,
            pool_size: 10,
        }
    }
}

/// Chunker (C2) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Ingestion concurrency: documents processed in parallel.
    pub max_concurrent_documents: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 300,
            max_concurrent_documents: 4,
        }
    }
}

/// Retrieval coordinator (C7) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    /// Boost applied to knowledge-base hits whose similarity exceeds 0.6.
    pub kb_boost: f32,
    /// Boost applied to EU-restricted web hits over broad hits.
    pub eu_boost: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.3,
            kb_boost: 0.1,
            eu_boost: 0.05,
        }
    }
}

/// Web searcher (C6) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    pub enabled: bool,
    /// Search provider base URL; overridable so tests can point this at a
    /// local fixture server instead of the real provider.
    #[serde(default = "default_web_search_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_results: usize,
    /// Official EU domains the `eu_restricted` query kind is pinned to.
    #[serde(default = "default_eu_domains")]
    pub eu_domains: Vec<String>,
    /// Process-wide bounded concurrency per provider.
    pub max_concurrent_per_provider: usize,
}

fn default_web_search_base_url() -> String {
    "https://api.search.example/v1/search".to_string()
}

fn default_eu_domains() -> Vec<String> {
    vec![
        "europa.eu".to_string(),
        "ec.europa.eu".to_string(),
        "eur-lex.europa.eu".to_string(),
        "consilium.europa.eu".to_string(),
        "europarl.europa.eu".to_string(),
    ]
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_web_search_base_url(),
            api_key: None,
            max_results: 5,
            eu_domains: default_eu_domains(),
            max_concurrent_per_provider: 4,
        }
    }
}

/// Query classifier (C8) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Use the LLM fallback path when rules are inconclusive.
    pub use_llm_fallback: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            use_llm_fallback: true,
        }
    }
}

/// Conversation memory (C10) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Process-wide cap on live sessions (LRU-evicted beyond this).
    pub max_sessions: u64,
    /// Turns retained per session.
    pub history_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            history_length: 20,
        }
    }
}

/// Per-request deadlines, in seconds (§5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlinesConfig {
    pub overall_secs: u64,
    pub embedding_secs: u64,
    pub llm_secs: u64,
    pub web_secs: u64,
    pub db_secs: u64,
}

impl Default for DeadlinesConfig {
    fn default() -> Self {
        Self {
            overall_secs: 25,
            embedding_secs: 8,
            llm_secs: 15,
            web_secs: 8,
            db_secs: 5,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: VectorStoreConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            web_search: WebSearchConfig::default(),
            classifier: ClassifierConfig::default(),
            session: SessionConfig::default(),
            deadlines: DeadlinesConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a JSON, TOML, or YAML file, by extension.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("unsupported config file format")),
        };
        Ok(config)
    }

    /// Persist configuration to a JSON, TOML, or YAML file, by extension.
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate invariants named throughout SPEC_FULL.md. Called once at
    /// startup by both the CLI and the HTTP server entry points.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.dimension == 0 {
            return Err(anyhow::anyhow!("embedding dimension must be greater than 0"));
        }

        if self.embedding.dimension != self.store.embedding_dim {
            return Err(anyhow::anyhow!(
                "embedding dimension ({}) does not match vector store schema dimension ({})",
                self.embedding.dimension,
                self.store.embedding_dim
            ));
        }

        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(anyhow::anyhow!(
                "chunk overlap ({}) must be strictly less than chunk size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(anyhow::anyhow!(
                "similarity threshold must be between 0.0 and 1.0"
            ));
        }

        if self.llm.model.is_empty() {
            return Err(anyhow::anyhow!("LLM model name cannot be empty"));
        }

        if self.embedding.model.is_empty() {
            return Err(anyhow::anyhow!("embedding model name cannot be empty"));
        }

        if self.session.history_length == 0 {
            return Err(anyhow::anyhow!("session history length must be greater than 0"));
        }

        if self.web_search.enabled && self.web_search.eu_domains.is_empty() {
            return Err(anyhow::anyhow!(
                "web search is enabled but no EU domains are allow-listed"
            ));
        }

        Ok(())
    }
}

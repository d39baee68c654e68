//! HTTP server entry point: wires the injected context object (§9) together
//! and serves the four routes of `api.rs`.

use std::sync::Arc;
use tracing::error;
use verdana_agent::agent::{Agent, AgentContext};
use verdana_agent::api::{self, AppState};
use verdana_agent::config::AgentConfig;
use verdana_agent::embedding::Embedder;
use verdana_agent::llm::{LlmClient, OllamaClient};
use verdana_agent::session::ConversationMemory;
use verdana_agent::speech::UnconfiguredTranscriber;
use verdana_agent::store::{SqliteVectorStore, VectorStore};
use verdana_agent::websearch::WebSearcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => AgentConfig::from_file(&path)?,
        None => AgentConfig::default(),
    };
    config.validate()?;

    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open(&config.store).await?);
    let embedder = Arc::new(Embedder::new(config.embedding.clone()));
    let web_searcher = Arc::new(WebSearcher::new(
        config.web_search.clone(),
        std::time::Duration::from_secs(config.deadlines.web_secs),
    ));
    let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(config.llm.clone()));
    let memory = Arc::new(ConversationMemory::new(config.session.clone()));

    let agent = Arc::new(Agent::new(AgentContext {
        store: store.clone(),
        embedder,
        web_searcher,
        llm,
        memory,
        config: config.clone(),
    }));

    let state = AppState::new(agent, store, Arc::new(UnconfiguredTranscriber));

    let host = std::env::var("VERDANA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("VERDANA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    if let Err(e) = api::start_server(state, &host, port).await {
        error!(error = %e, "server exited with error");
        return Err(e.into());
    }

    Ok(())
}

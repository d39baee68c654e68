//! Ingestion CLI: `verdana-ingest <directory> [--config <path>]`.
//!
//! Exit codes: 0 success, 1 one or more documents failed, 2 configuration error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use verdana_agent::config::AgentConfig;
use verdana_agent::embedding::Embedder;
use verdana_agent::ingest;
use verdana_agent::store::{SqliteVectorStore, VectorStore};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let Some(directory) = args.next() else {
        eprintln!("usage: verdana-ingest <directory> [--config <path>]");
        return ExitCode::from(2);
    };

    let config = match args.next().as_deref() {
        Some("--config") => match args.next() {
            Some(path) => match AgentConfig::from_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!(error = %e, "failed to load config from {path}");
                    return ExitCode::from(2);
                }
            },
            None => {
                eprintln!("--config requires a path argument");
                return ExitCode::from(2);
            }
        },
        _ => AgentConfig::default(),
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::from(2);
    }

    let store: Arc<dyn VectorStore> = match SqliteVectorStore::open(&config.store).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to open vector store");
            return ExitCode::from(2);
        }
    };
    let embedder = Arc::new(Embedder::new(config.embedding.clone()));

    info!(directory = %directory, "starting ingestion");
    let report = match ingest::ingest_directory(&PathBuf::from(&directory), store, embedder, &config).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "ingestion run failed");
            return ExitCode::from(2);
        }
    };

    info!(
        processed = report.processed,
        skipped_unchanged = report.skipped_unchanged,
        failed = report.failed.len(),
        "ingestion complete"
    );

    for (path, error) in &report.failed {
        warn!(file = %path.display(), error = %error, "document failed to ingest");
    }

    if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

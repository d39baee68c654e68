//! Ingestion Driver (C5): walks a directory, extracts, chunks, embeds, and
//! stores each file, skipping unchanged content by hash.

use crate::chunking;
use crate::config::AgentConfig;
use crate::embedding::Embedder;
use crate::error::{AgentError, Result};
use crate::extraction;
use crate::store::VectorStore;
use crate::types::{Chunk, Document};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Outcome of ingesting a whole directory.
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub processed: usize,
    pub skipped_unchanged: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Walks `dir`, ingesting every recognized file at most `max_concurrent_documents`
/// at a time. Idempotent: files whose content hash is already stored are a no-op.
pub async fn ingest_directory(
    dir: &Path,
    store: Arc<dyn VectorStore>,
    embedder: Arc<Embedder>,
    config: &AgentConfig,
) -> Result<IngestionReport> {
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let semaphore = Arc::new(Semaphore::new(config.chunking.max_concurrent_documents.max(1)));
    let mut tasks = Vec::with_capacity(files.len());

    for path in files {
        let store = store.clone();
        let embedder = embedder.clone();
        let semaphore = semaphore.clone();
        let chunking_config = config.chunking.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let result = ingest_file(&path, store, embedder, &chunking_config).await;
            (path, result)
        }));
    }

    let mut report = IngestionReport::default();
    for task in tasks {
        let (path, result) = task.await.map_err(|e| AgentError::Config(e.to_string()))?;
        match result {
            Ok(true) => report.processed += 1,
            Ok(false) => report.skipped_unchanged += 1,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "ingestion failed for file");
                report.failed.push((path, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Returns `Ok(true)` if the file was newly ingested, `Ok(false)` if its
/// content hash already exists (idempotent no-op).
async fn ingest_file(
    path: &Path,
    store: Arc<dyn VectorStore>,
    embedder: Arc<Embedder>,
    chunking_config: &crate::config::ChunkingConfig,
) -> Result<bool> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| crate::error::ExtractionError::Unreadable(e.to_string()))?;

    let path_owned = path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || extraction::extract(&path_owned, &bytes))
        .await
        .map_err(|e| AgentError::Config(e.to_string()))??;

    if store
        .get_document_by_hash(&extracted.content_hash)
        .await?
        .is_some()
    {
        return Ok(false);
    }

    let now = chrono::Utc::now();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let document = Document {
        id: Uuid::new_v4().to_string(),
        filename: filename.clone(),
        title: filename.clone(),
        url: None,
        content: extracted.text.clone(),
        content_hash: extracted.content_hash,
        metadata: HashMap::new(),
        created_at: now,
        updated_at: now,
    };
    let document_id = store.upsert_document(&document).await?;

    let text_chunks = chunking::chunk(&extracted.text, chunking_config);
    if text_chunks.is_empty() {
        info!(file = %path.display(), "no chunks produced for file");
        return Ok(true);
    }

    let texts: Vec<String> = text_chunks.iter().map(|c| c.content.clone()).collect();

    // If embedding fails mid-document, roll back the document row itself.
    // Leaving it in place with zero chunks would make the hash check above
    // treat this document as already ingested on every later run.
    let embeddings = match embedder.embed(&texts).await {
        Ok(e) => e,
        Err(e) => {
            store.delete_document(&document_id).await.ok();
            return Err(e);
        }
    };

    let chunks: Vec<Chunk> = text_chunks
        .into_iter()
        .zip(embeddings)
        .map(|(tc, embedding)| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.clone(),
            index: tc.index,
            content: tc.content,
            embedding,
            filename: filename.clone(),
            title: filename.clone(),
            metadata: HashMap::new(),
        })
        .collect();

    store.insert_chunks(&chunks).await?;
    info!(file = %path.display(), chunks = chunks.len(), "ingested file");
    Ok(true)
}

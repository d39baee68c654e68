//! Vector store (C4): content-addressed document storage plus brute-force
//! cosine-similarity chunk search.

mod sqlite;

pub use sqlite::SqliteVectorStore;

use crate::error::Result;
use crate::types::{Chunk, Document, ScoredChunk};
use async_trait::async_trait;

/// Storage and retrieval surface for documents and their chunks.
///
/// SQLite has no native vector index in this dependency set, so `search` is a
/// brute-force scan over all chunk embeddings — correct, not approximate, at
/// the corpus sizes this crate targets.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts `document` if its `content_hash` is new; a no-op returning the
    /// existing id otherwise. Idempotent ingestion depends on this.
    async fn upsert_document(&self, document: &Document) -> Result<String>;

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Deletes a document's chunks without the document row, used to mark an
    /// ingestion as incomplete after a mid-document embedding failure.
    async fn clear_chunks(&self, document_id: &str) -> Result<()>;

    /// Deletes a document and, via the schema's `ON DELETE CASCADE`, all of
    /// its chunks. The only way a document is destroyed.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    async fn get_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Number of chunks stored for one document.
    async fn chunk_count(&self, document_id: &str) -> Result<usize>;

    /// Total `(document_count, chunk_count, avg_chunk_length)` across the
    /// whole store, for the health endpoint. `avg_chunk_length` is the mean
    /// character length of stored chunk content, `0.0` when there are none.
    async fn stats(&self) -> Result<(usize, usize, f64)>;

    /// Brute-force cosine similarity search over all stored chunks, returning
    /// at most `limit` results at or above `threshold`, highest first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Cosine similarity of two equal-length vectors; `0.0` on dimension mismatch
/// or either vector being zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

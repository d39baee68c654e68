//! SQLite-backed `VectorStore` implementation.

use super::{cosine_similarity, deserialize_embedding, serialize_embedding, VectorStore};
use crate::config::VectorStoreConfig;
use crate::error::{Result, VectorStoreError};
use crate::types::{Chunk, Document, ScoredChunk};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashMap;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedding_dim: usize,
}

impl SqliteVectorStore {
    /// Opens (creating if needed) the store at `config.database_url`, runs
    /// schema migration, and refuses to serve if an existing store's recorded
    /// dimension differs from `config.embedding_dim`.
    pub async fn open(config: &VectorStoreConfig) -> Result<Self> {
        let url = if config.database_url.contains('?') {
            config.database_url.clone()
        } else {
            format!("{}?mode=rwc", config.database_url)
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                UNIQUE(document_id, chunk_index)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON document_chunks(document_id)",
        )
        .execute(&pool)
        .await
        .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;

        let store = Self {
            pool,
            embedding_dim: config.embedding_dim,
        };
        store.check_dimension().await?;
        Ok(store)
    }

    /// Compares `embedding_dim` against an arbitrary stored chunk's embedding
    /// length. An empty store always passes; this only catches drift against
    /// data written under a different configuration.
    async fn check_dimension(&self) -> Result<()> {
        let row = sqlx::query("SELECT embedding FROM document_chunks LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;

        if let Some(row) = row {
            let blob: Vec<u8> = row.get("embedding");
            let actual = blob.len() / 4;
            if actual != self.embedding_dim {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.embedding_dim,
                    actual,
                }
                .into());
            }
        }
        Ok(())
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");
        let metadata_json: String = row.get("metadata");
        Ok(Document {
            id: row.get("id"),
            filename: row.get("filename"),
            title: row.get("title"),
            url: row.get("url"),
            content: row.get("content"),
            content_hash: row.get("content_hash"),
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            created_at: parse_rfc3339(&created_at)?,
            updated_at: parse_rfc3339(&updated_at)?,
        })
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VectorStoreError::StorageFailed(e.to_string()).into())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_document(&self, document: &Document) -> Result<String> {
        if let Some(existing) = self.get_document_by_hash(&document.content_hash).await? {
            return Ok(existing.id);
        }

        let metadata_json = serde_json::to_string(&document.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, title, url, content, content_hash, metadata, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&document.id)
        .bind(&document.filename)
        .bind(&document.title)
        .bind(&document.url)
        .bind(&document.content)
        .bind(&document.content_hash)
        .bind(&metadata_json)
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;

        Ok(document.id.clone())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            if chunk.embedding.len() != self.embedding_dim {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.embedding_dim,
                    actual: chunk.embedding.len(),
                }
                .into());
            }
            let blob = serialize_embedding(&chunk.embedding);
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO document_chunks (id, document_id, chunk_index, content, embedding, metadata)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.index as i64)
            .bind(&chunk.content)
            .bind(blob)
            .bind(metadata_json)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn clear_chunks(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        Ok(())
    }

    async fn get_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE content_hash = ?1")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        rows.iter().map(Self::row_to_document).collect()
    }

    async fn chunk_count(&self, document_id: &str) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM document_chunks WHERE document_id = ?1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        Ok(row.get::<i64, _>("n") as usize)
    }

    async fn stats(&self) -> Result<(usize, usize, f64)> {
        let doc_row = sqlx::query("SELECT COUNT(*) AS n FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        let chunk_row = sqlx::query("SELECT COUNT(*) AS n, AVG(LENGTH(content)) AS avg_len FROM document_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::StorageFailed(e.to_string()))?;
        let avg_chunk_length: Option<f64> = chunk_row.try_get("avg_len").unwrap_or(None);
        Ok((
            doc_row.get::<i64, _>("n") as usize,
            chunk_row.get::<i64, _>("n") as usize,
            avg_chunk_length.unwrap_or(0.0),
        ))
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content, c.embedding, c.metadata,
                   d.filename, d.title
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let embedding = deserialize_embedding(&blob);
            let similarity = cosine_similarity(query_embedding, &embedding);
            if similarity < threshold {
                continue;
            }
            let metadata_json: String = row.get("metadata");
            let metadata: HashMap<String, String> =
                serde_json::from_str(&metadata_json).unwrap_or_default();
            let chunk = Chunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                index: row.get::<i64, _>("chunk_index") as usize,
                content: row.get("content"),
                embedding,
                filename: row.get("filename"),
                title: row.get("title"),
                metadata,
            };
            results.push(ScoredChunk { chunk, similarity });
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn test_store(dim: usize) -> SqliteVectorStore {
        let config = VectorStoreConfig {
            database_url: "sqlite::memory:".to_string(),
            embedding_dim: dim,
            pool_size: 1,
        };
        SqliteVectorStore::open(&config).await.unwrap()
    }

    fn sample_document(hash: &str) -> Document {
        let now = Utc::now();
        Document {
            id: uuid::Uuid::new_v4().to_string(),
            filename: "doc.txt".to_string(),
            title: "Doc".to_string(),
            url: None,
            content: "body".to_string(),
            content_hash: hash.to_string(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_hash() {
        let store = test_store(4).await;
        let doc = sample_document("hash-a");
        let id1 = store.upsert_document(&doc).await.unwrap();
        let id2 = store.upsert_document(&doc).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_respects_threshold() {
        let store = test_store(3).await;
        let doc = sample_document("hash-b");
        let doc_id = store.upsert_document(&doc).await.unwrap();
        let chunk = Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: doc_id,
            index: 0,
            content: "text".to_string(),
            embedding: vec![1.0, 0.0, 0.0],
            filename: "doc.txt".to_string(),
            title: "Doc".to_string(),
            metadata: HashMap::new(),
        };
        store.insert_chunks(&[chunk]).await.unwrap();

        let orthogonal = store.search(&[0.0, 1.0, 0.0], 10, 0.3).await.unwrap();
        assert!(orthogonal.is_empty());

        let matching = store.search(&[1.0, 0.0, 0.0], 10, 0.3).await.unwrap();
        assert_eq!(matching.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_counts_documents_and_chunks() {
        let store = test_store(3).await;
        let doc = sample_document("hash-stats");
        let doc_id = store.upsert_document(&doc).await.unwrap();
        let chunk = Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: doc_id.clone(),
            index: 0,
            content: "text".to_string(),
            embedding: vec![1.0, 0.0, 0.0],
            filename: "doc.txt".to_string(),
            title: "Doc".to_string(),
            metadata: HashMap::new(),
        };
        store.insert_chunks(&[chunk]).await.unwrap();

        assert_eq!(store.chunk_count(&doc_id).await.unwrap(), 1);
        let (doc_count, chunk_count, avg_len) = store.stats().await.unwrap();
        assert_eq!((doc_count, chunk_count), (1, 1));
        assert_eq!(avg_len, "text".len() as f64);
    }

    #[tokio::test]
    async fn test_stats_avg_chunk_length_is_zero_when_empty() {
        let store = test_store(3).await;
        let (_, _, avg_len) = store.stats().await.unwrap();
        assert_eq!(avg_len, 0.0);
    }

    #[tokio::test]
    async fn test_delete_document_cascades_to_chunks() {
        let store = test_store(3).await;
        let doc = sample_document("hash-delete");
        let doc_id = store.upsert_document(&doc).await.unwrap();
        let chunk = Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: doc_id.clone(),
            index: 0,
            content: "text".to_string(),
            embedding: vec![1.0, 0.0, 0.0],
            filename: "doc.txt".to_string(),
            title: "Doc".to_string(),
            metadata: HashMap::new(),
        };
        store.insert_chunks(&[chunk]).await.unwrap();

        store.delete_document(&doc_id).await.unwrap();
        assert!(store.get_document(&doc_id).await.unwrap().is_none());
        assert_eq!(store.chunk_count(&doc_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_breaks_similarity_ties_by_chunk_id() {
        let store = test_store(3).await;
        let doc = sample_document("hash-tie");
        let doc_id = store.upsert_document(&doc).await.unwrap();
        let chunks = vec![
            Chunk {
                id: "chunk-b".to_string(),
                document_id: doc_id.clone(),
                index: 0,
                content: "text".to_string(),
                embedding: vec![1.0, 0.0, 0.0],
                filename: "doc.txt".to_string(),
                title: "Doc".to_string(),
                metadata: HashMap::new(),
            },
            Chunk {
                id: "chunk-a".to_string(),
                document_id: doc_id,
                index: 1,
                content: "text".to_string(),
                embedding: vec![1.0, 0.0, 0.0],
                filename: "doc.txt".to_string(),
                title: "Doc".to_string(),
                metadata: HashMap::new(),
            },
        ];
        store.insert_chunks(&chunks).await.unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "chunk-a");
        assert_eq!(results[1].chunk.id, "chunk-b");
    }

    #[tokio::test]
    async fn test_chunk_dimension_mismatch_rejected() {
        let store = test_store(3).await;
        let doc = sample_document("hash-c");
        let doc_id = store.upsert_document(&doc).await.unwrap();
        let chunk = Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: doc_id,
            index: 0,
            content: "text".to_string(),
            embedding: vec![1.0, 0.0],
            filename: "doc.txt".to_string(),
            title: "Doc".to_string(),
            metadata: HashMap::new(),
        };
        let err = store.insert_chunks(&[chunk]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::AgentError::VectorStore(VectorStoreError::DimensionMismatch { .. })
        ));
    }
}

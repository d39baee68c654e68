//! Core data model shared across components (§3 of the design).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// A source file ingested into the knowledge base. Immutable once created;
/// the `content_hash` is the sole uniqueness key (re-ingesting the same
/// bytes is a no-op, see `VectorStore::upsert_document`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub title: String,
    pub url: Option<String>,
    pub content: String,
    /// SHA-256 over the normalized extracted bytes.
    pub content_hash: String,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One contiguous, overlapping slice of a `Document`'s text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Denormalized for display without a join back to `documents`.
    pub filename: String,
    pub title: String,
    pub metadata: HashMap<String, String>,
}

/// A chunk returned from a similarity search, with its score attached.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// The normalized evidence item returned to callers. A tagged variant with a
/// common display core and a variant-specific payload (§9 redesign: replaces
/// the teacher's dynamic, field-differing response shapes).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRef {
    KnowledgeBase {
        title: String,
        url: Option<String>,
        filename: String,
        document_id: String,
        chunk_index: usize,
        similarity: f32,
    },
    WebVerification {
        title: String,
        url: Option<String>,
        score: f32,
    },
    WebSearch {
        title: String,
        url: Option<String>,
        score: f32,
    },
    Verification {
        title: String,
        url: Option<String>,
        verified: bool,
    },
}

impl SourceRef {
    pub fn title(&self) -> &str {
        match self {
            SourceRef::KnowledgeBase { title, .. } => title,
            SourceRef::WebVerification { title, .. } => title,
            SourceRef::WebSearch { title, .. } => title,
            SourceRef::Verification { title, .. } => title,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            SourceRef::KnowledgeBase { url, .. } => url.as_deref(),
            SourceRef::WebVerification { url, .. } => url.as_deref(),
            SourceRef::WebSearch { url, .. } => url.as_deref(),
            SourceRef::Verification { url, .. } => url.as_deref(),
        }
    }

    /// Unified score, for ranking purposes, in [0,1].
    pub fn score(&self) -> f32 {
        match self {
            SourceRef::KnowledgeBase { similarity, .. } => *similarity,
            SourceRef::WebVerification { score, .. } => *score,
            SourceRef::WebSearch { score, .. } => *score,
            SourceRef::Verification { verified, .. } => {
                if *verified {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            SourceRef::KnowledgeBase { .. } => "knowledge_base",
            SourceRef::WebVerification { .. } => "web_verification",
            SourceRef::WebSearch { .. } => "web_search",
            SourceRef::Verification { .. } => "verification",
        }
    }
}

/// One (user message, assistant message) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub user_message: String,
    pub assistant_message: String,
    pub sources: Vec<SourceRef>,
    pub timestamp: DateTime<Utc>,
}

/// The classifier's verdict for an inbound query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    SmallTalk,
    Identity,
    Policy,
    Meta,
}

/// Which of the two web-search query kinds to issue (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSearchKind {
    EuRestricted,
    Broad,
}

/// A single web search hit, before normalization into a `SourceRef`.
#[derive(Debug, Clone)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: f32,
}

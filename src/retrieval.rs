//! Retrieval Coordinator (C7): fans out to the vector store and both web
//! search kinds concurrently, merges and dedups the results, and applies
//! configured ranking boosts.
//!
//! The teacher's `agent.rs` issues its memory/tool calls with sequential
//! `.await`s; this coordinator replaces that with a `tokio::join!`-based fan-out
//! so the three lookups run in parallel, each under its own deadline.

use crate::config::{DeadlinesConfig, RetrievalConfig};
use crate::embedding::Embedder;
use crate::store::VectorStore;
use crate::types::{ScoredChunk, SourceRef, WebSearchKind, WebSearchResult};
use crate::websearch::WebSearcher;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Runs the three-way retrieval fan-out under per-task deadlines.
pub struct RetrievalScope<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a Embedder,
    web_searcher: &'a WebSearcher,
    retrieval: &'a RetrievalConfig,
    deadlines: &'a DeadlinesConfig,
}

impl<'a> RetrievalScope<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a Embedder,
        web_searcher: &'a WebSearcher,
        retrieval: &'a RetrievalConfig,
        deadlines: &'a DeadlinesConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            web_searcher,
            retrieval,
            deadlines,
        }
    }

    /// Runs vector search plus both web search kinds concurrently, merges,
    /// dedups, ranks, and truncates to `top_k`.
    pub async fn retrieve(&self, query: &str) -> Vec<SourceRef> {
        let (kb_hits, eu_hits, broad_hits) = tokio::join!(
            self.search_kb(query),
            self.search_web(query, WebSearchKind::EuRestricted),
            self.search_web(query, WebSearchKind::Broad),
        );

        let mut sources: Vec<SourceRef> = Vec::new();
        sources.extend(kb_hits.into_iter().map(chunk_to_source));
        sources.extend(
            eu_hits
                .into_iter()
                .map(|r| web_result_to_source(r, true, self.retrieval)),
        );
        sources.extend(
            broad_hits
                .into_iter()
                .map(|r| web_result_to_source(r, false, self.retrieval)),
        );

        let deduped = dedup(sources);
        let mut ranked = rank(deduped, self.retrieval);
        ranked.truncate(self.retrieval.top_k);
        ranked
    }

    async fn search_kb(&self, query: &str) -> Vec<ScoredChunk> {
        let deadline = Duration::from_secs(self.deadlines.db_secs.max(self.deadlines.embedding_secs));
        let future = async {
            let embeddings = self.embedder.embed(&[query.to_string()]).await.ok()?;
            let query_embedding = embeddings.into_iter().next()?;
            self.store
                .search(
                    &query_embedding,
                    self.retrieval.top_k * 2,
                    self.retrieval.similarity_threshold,
                )
                .await
                .ok()
        };
        match tokio::time::timeout(deadline, future).await {
            Ok(Some(hits)) => hits,
            Ok(None) => Vec::new(),
            Err(_) => {
                warn!("knowledge base search timed out");
                Vec::new()
            }
        }
    }

    async fn search_web(&self, query: &str, kind: WebSearchKind) -> Vec<WebSearchResult> {
        let deadline = Duration::from_secs(self.deadlines.web_secs);
        match tokio::time::timeout(
            deadline,
            self.web_searcher
                .search(query, kind, self.retrieval.top_k),
        )
        .await
        {
            Ok(results) => results,
            Err(_) => {
                warn!(?kind, "web search timed out");
                Vec::new()
            }
        }
    }
}

fn chunk_to_source(scored: ScoredChunk) -> SourceRef {
    SourceRef::KnowledgeBase {
        title: scored.chunk.title,
        url: None,
        filename: scored.chunk.filename,
        document_id: scored.chunk.document_id,
        chunk_index: scored.chunk.index,
        similarity: scored.similarity,
    }
}

fn web_result_to_source(result: WebSearchResult, eu_restricted: bool, config: &RetrievalConfig) -> SourceRef {
    let mut score = result.score;
    if eu_restricted {
        score = (score + config.eu_boost).min(1.0);
    }
    if eu_restricted {
        SourceRef::WebVerification {
            title: result.title,
            url: Some(result.url),
            score,
        }
    } else {
        SourceRef::WebSearch {
            title: result.title,
            url: Some(result.url),
            score,
        }
    }
}

/// Dedups by canonicalized URL (web sources) and by `(document_id, chunk_index)`
/// (knowledge base sources), keeping the first (highest-scored, pre-sort) hit.
fn dedup(sources: Vec<SourceRef>) -> Vec<SourceRef> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_chunks: HashSet<(String, usize)> = HashSet::new();
    let mut out = Vec::with_capacity(sources.len());

    for source in sources {
        match &source {
            SourceRef::KnowledgeBase {
                document_id,
                chunk_index,
                ..
            } => {
                let key = (document_id.clone(), *chunk_index);
                if seen_chunks.insert(key) {
                    out.push(source);
                }
            }
            _ => {
                if let Some(url) = source.url() {
                    let canon = canonicalize_url(url);
                    if seen_urls.insert(canon) {
                        out.push(source);
                    }
                } else {
                    out.push(source);
                }
            }
        }
    }
    out
}

/// Canonicalizes a URL to scheme+host+path, stripping the default port and a
/// trailing slash, so `http://europa.eu/page` and `http://europa.eu/page/`
/// dedup to the same key.
fn canonicalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => {
            let scheme = url.scheme();
            let host = url.host_str().unwrap_or("");
            let path = url.path().trim_end_matches('/');
            format!("{scheme}://{host}{path}")
        }
        Err(_) => raw.to_string(),
    }
}

/// Applies the knowledge-base similarity boost and clips every score to
/// `[0, 1]`, then sorts descending by score.
fn rank(mut sources: Vec<SourceRef>, config: &RetrievalConfig) -> Vec<SourceRef> {
    for source in &mut sources {
        if let SourceRef::KnowledgeBase { similarity, .. } = source {
            if *similarity > 0.6 {
                *similarity = (*similarity + config.kb_boost).min(1.0);
            }
        }
    }
    sources.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_strips_trailing_slash_and_default_port() {
        assert_eq!(
            canonicalize_url("https://europa.eu:443/page/"),
            canonicalize_url("https://europa.eu/page")
        );
    }

    #[test]
    fn test_dedup_keeps_first_chunk_occurrence() {
        let sources = vec![
            SourceRef::KnowledgeBase {
                title: "A".to_string(),
                url: None,
                filename: "f.txt".to_string(),
                document_id: "doc1".to_string(),
                chunk_index: 0,
                similarity: 0.9,
            },
            SourceRef::KnowledgeBase {
                title: "A dup".to_string(),
                url: None,
                filename: "f.txt".to_string(),
                document_id: "doc1".to_string(),
                chunk_index: 0,
                similarity: 0.5,
            },
        ];
        let deduped = dedup(sources);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].title(), "A");
    }

    #[test]
    fn test_rank_clips_boosted_score_to_one() {
        let config = RetrievalConfig {
            top_k: 5,
            similarity_threshold: 0.3,
            kb_boost: 0.5,
            eu_boost: 0.05,
        };
        let sources = vec![SourceRef::KnowledgeBase {
            title: "A".to_string(),
            url: None,
            filename: "f.txt".to_string(),
            document_id: "doc1".to_string(),
            chunk_index: 0,
            similarity: 0.95,
        }];
        let ranked = rank(sources, &config);
        assert!(ranked[0].score() <= 1.0);
    }

    #[test]
    fn test_eu_restricted_outranks_equal_broad_hit() {
        let config = RetrievalConfig {
            top_k: 5,
            similarity_threshold: 0.3,
            kb_boost: 0.1,
            eu_boost: 0.05,
        };
        let eu = web_result_to_source(
            WebSearchResult {
                title: "EU".to_string(),
                url: "https://europa.eu/x".to_string(),
                snippet: String::new(),
                score: 0.7,
            },
            true,
            &config,
        );
        let broad = web_result_to_source(
            WebSearchResult {
                title: "Broad".to_string(),
                url: "https://example.com/x".to_string(),
                snippet: String::new(),
                score: 0.7,
            },
            false,
            &config,
        );
        assert!(eu.score() > broad.score());
    }
}

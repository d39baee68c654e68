//! Web Searcher (C6): a JSON-API search client, bounded to a fixed number of
//! in-flight requests per provider. Failure here never fails the overall
//! query — callers get an empty list and log a warning.

use crate::config::WebSearchConfig;
use crate::error::WebSearchError;
use crate::types::{WebSearchKind, WebSearchResult};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    score: f32,
}

/// Client for the web search provider, following the teacher's
/// `HttpProviderClient` shape: a bounded-timeout `reqwest::Client` plus typed
/// error mapping from HTTP status codes.
pub struct WebSearcher {
    client: Client,
    config: WebSearchConfig,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl WebSearcher {
    pub fn new(config: WebSearchConfig, timeout: Duration) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_per_provider.max(1)));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build web search HTTP client");
        Self {
            client,
            config,
            semaphore,
            timeout,
        }
    }

    /// Issues a search. `eu_restricted` constrains to `config.eu_domains`;
    /// `broad` is unconstrained. Never returns `Err` to the caller — upstream
    /// failures degrade to an empty list.
    pub async fn search(
        &self,
        query: &str,
        kind: WebSearchKind,
        max_results: usize,
    ) -> Vec<WebSearchResult> {
        if !self.config.enabled {
            return Vec::new();
        }

        let Some(api_key) = self.config.api_key.as_deref() else {
            warn!("web search enabled but no API key configured; skipping");
            return Vec::new();
        };

        let _permit = match self.semaphore.try_acquire() {
            Ok(p) => p,
            Err(_) => match self.semaphore.acquire().await {
                Ok(p) => p,
                Err(_) => return Vec::new(),
            },
        };

        let effective_query = match kind {
            WebSearchKind::EuRestricted => site_restricted_query(query, &self.config.eu_domains),
            WebSearchKind::Broad => query.to_string(),
        };

        match self
            .search_once(&effective_query, max_results, api_key)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "web search failed, returning no results");
                Vec::new()
            }
        }
    }

    async fn search_once(
        &self,
        query: &str,
        max_results: usize,
        api_key: &str,
    ) -> Result<Vec<WebSearchResult>, WebSearchError> {
        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .get(&self.config.base_url)
                .bearer_auth(api_key)
                .query(&[("q", query), ("count", &max_results.to_string())])
                .send(),
        )
        .await
        .map_err(|_| WebSearchError::RequestFailed("timed out".to_string()))?
        .map_err(|e| WebSearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebSearchError::UpstreamStatus(status.as_u16()));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| WebSearchError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| WebSearchResult {
                title: r.title,
                url: r.url,
                snippet: r.snippet,
                score: r.score,
            })
            .collect())
    }
}

/// Builds an `OR`-joined `site:` restriction for the allow-listed EU domains.
fn site_restricted_query(query: &str, domains: &[String]) -> String {
    if domains.is_empty() {
        return query.to_string();
    }
    let sites = domains
        .iter()
        .map(|d| format!("site:{d}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("{query} ({sites})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_restriction_joins_domains() {
        let q = site_restricted_query(
            "carbon tax",
            &["europa.eu".to_string(), "ec.europa.eu".to_string()],
        );
        assert!(q.contains("site:europa.eu"));
        assert!(q.contains("site:ec.europa.eu"));
        assert!(q.contains("OR"));
    }

    #[tokio::test]
    async fn test_search_returns_empty_without_api_key() {
        let config = WebSearchConfig {
            api_key: None,
            ..WebSearchConfig::default()
        };
        let searcher = WebSearcher::new(config, Duration::from_secs(8));
        let results = searcher
            .search("test query", WebSearchKind::Broad, 5)
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_returns_empty_when_disabled() {
        let config = WebSearchConfig {
            enabled: false,
            ..WebSearchConfig::default()
        };
        let searcher = WebSearcher::new(config, Duration::from_secs(8));
        let results = searcher
            .search("test query", WebSearchKind::EuRestricted, 5)
            .await;
        assert!(results.is_empty());
    }
}

//! HTTP search client

use super::{build_category, SearchBackend, SearchEntry, SearchError, SearchRequest, SearchResults};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ORIGIN, REFERER, USER_AGENT};
use reqwest::StatusCode;
use searchbot_core::config::SearchConfig;
use searchbot_core::{Error, Result};
use serde::Deserialize;
use url::Url;

/// Metasearch API client
pub struct SearchClient {
    /// Search configuration
    config: SearchConfig,
    /// Parsed endpoint, without query
    endpoint: Url,
    /// Encoded engine selection, computed once
    category: String,
    /// HTTP client
    client: reqwest::Client,
}

/// One failed attempt
#[derive(Debug)]
enum Failure {
    /// Worth another attempt
    Retryable(String),
    /// Retrying will not help
    Fatal(String),
}

#[derive(Deserialize)]
struct Envelope {
    results: Vec<serde_json::Value>,
}

impl SearchClient {
    /// Create a new search client
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::Config(format!("Invalid search endpoint {}: {}", config.endpoint, e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            category: build_category(&config.engines),
            config: config.clone(),
            endpoint,
            client,
        })
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("category", &self.category)
            .append_pair("pages", "1")
            .append_pair("q", query)
            .append_pair("start", "1");
        url
    }

    /// Perform one HTTP attempt and return the body of a successful response
    async fn fetch(&self, query: &str) -> std::result::Result<String, Failure> {
        let mut req = self
            .client
            .get(self.request_url(query))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.config.user_agent);

        if let Some(origin) = &self.config.origin {
            req = req.header(ORIGIN, origin);
        }
        if let Some(referer) = &self.config.referer {
            req = req.header(REFERER, referer);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Failure::Retryable("request timed out".to_string())
            } else {
                Failure::Retryable(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::Retryable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(Failure::Fatal(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| Failure::Retryable(format!("failed to read body: {}", e)))
    }
}

/// Decode a response body, keeping upstream order and at most `max_results` entries
pub(crate) fn parse_results(body: &str, max_results: usize) -> std::result::Result<SearchResults, SearchError> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
        tracing::debug!("Unusable search response: {}", e);
        SearchError::NoResults
    })?;

    let entries: Vec<SearchEntry> = envelope
        .results
        .into_iter()
        .filter_map(|value| serde_json::from_value::<SearchEntry>(value).ok())
        .filter(|entry| !entry.url.trim().is_empty())
        .take(max_results)
        .collect();

    if entries.is_empty() {
        return Err(SearchError::NoResults);
    }

    Ok(SearchResults::new(entries))
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn search(&self, request: &SearchRequest) -> std::result::Result<SearchResults, SearchError> {
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            match self.fetch(&request.query).await {
                Ok(body) => {
                    let results = parse_results(&body, self.config.max_results);
                    match &results {
                        Ok(results) => tracing::debug!("Search for {} returned {} entries", request.requester, results.len()),
                        Err(e) => tracing::debug!("Search for {} failed: {}", request.requester, e),
                    }
                    return results;
                }
                Err(Failure::Fatal(reason)) => {
                    tracing::warn!("Search backend rejected request: {}", reason);
                    return Err(SearchError::Unavailable);
                }
                Err(Failure::Retryable(reason)) => {
                    tracing::warn!("Search attempt {}/{} failed: {}", attempt, attempts, reason);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff() * attempt).await;
                    }
                }
            }
        }

        Err(SearchError::Unavailable)
    }
}

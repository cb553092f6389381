//! Upstream metasearch access
//!
//! The dispatcher only sees the [`SearchBackend`] trait. [`SearchClient`]
//! is the HTTP implementation used in production.

mod category;
mod client;

pub use category::{build_category, category_json};
pub use client::SearchClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use searchbot_core::Identity;
use serde::Deserialize;
use thiserror::Error;

/// A single search, scoped to one command
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub requester: Identity,
    pub timestamp: DateTime<Utc>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, requester: Identity) -> Self {
        Self {
            query: query.into(),
            requester,
            timestamp: Utc::now(),
        }
    }
}

/// One ranked result
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub score: f64,
}

/// Results in upstream rank order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    entries: Vec<SearchEntry>,
}

impl SearchResults {
    pub fn new(entries: Vec<SearchEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SearchEntry] {
        &self.entries
    }
}

impl IntoIterator for SearchResults {
    type Item = SearchEntry;
    type IntoIter = std::vec::IntoIter<SearchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Why a search produced nothing to show
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    /// Timeouts, transport failures or HTTP errors, after retries
    #[error("search backend unavailable")]
    Unavailable,
    /// The backend answered but had nothing usable
    #[error("no results")]
    NoResults,
}

/// Something that can answer a search
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, SearchError>;
}

//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] controls the API endpoint, typing gates, merge limits,
//! caching and quota bookkeeping. Every field has a default, so partial
//! TOML/JSON documents deserialize cleanly.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Configuration for the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the API. Tests point this at a mock server.
    pub base_url: String,
    /// User-Agent sent with every request (the API rejects requests without one).
    pub user_agent: String,
    /// Minimum trimmed query length (in chars) before a search is issued.
    pub min_chars: usize,
    /// Maximum time a changed value waits before being committed.
    pub debounce_ms: u64,
    /// Silence required before committing while the user is still typing.
    pub typing_threshold_ms: u64,
    /// Optional personal access token, sent as a bearer credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Page size requested from the repository endpoint.
    pub per_page: u32,
    /// Cap on the merged result list.
    pub max_results: usize,
    /// Fewer repository hits than this triggers a supplementary user search.
    pub sparse_threshold: usize,
    /// Queries shorter than this (in chars) always include a user search.
    pub short_query_chars: usize,
    /// How long cached results stay valid.
    pub cache_ttl_secs: u64,
    /// Request quota without a credential.
    pub anonymous_limit: u32,
    /// Request quota with a credential.
    pub authenticated_limit: u32,
    /// Assumed quota window when the provider does not report a reset time.
    pub quota_window_secs: u64,
    /// Per-request timeout. `None` keeps the transport default (no timeout).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".into(),
            user_agent: concat!("hubcomplete/", env!("CARGO_PKG_VERSION")).into(),
            min_chars: 3,
            debounce_ms: 500,
            typing_threshold_ms: 500,
            credential: None,
            per_page: 40,
            max_results: 50,
            sparse_threshold: 8,
            short_query_chars: 4,
            cache_ttl_secs: 24 * 60 * 60,
            anonymous_limit: 10,
            authenticated_limit: 30,
            quota_window_secs: 60,
            timeout_seconds: None,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `min_chars`, `per_page`, `max_results` must be greater than 0
    /// - `debounce_ms` must be greater than 0
    /// - `base_url` must parse as an absolute URL
    /// - `anonymous_limit` must be > 0 and <= `authenticated_limit`
    /// - `timeout_seconds`, when set, must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.min_chars == 0 {
            return Err(SearchError::Config("min_chars must be greater than 0".into()));
        }
        if self.per_page == 0 || self.per_page > 100 {
            return Err(SearchError::Config("per_page must be between 1 and 100".into()));
        }
        if self.max_results == 0 {
            return Err(SearchError::Config(
                "max_results must be greater than 0".into(),
            ));
        }
        if self.debounce_ms == 0 {
            return Err(SearchError::Config(
                "debounce_ms must be greater than 0".into(),
            ));
        }
        if let Err(e) = url::Url::parse(&self.base_url) {
            return Err(SearchError::Config(format!("base_url is invalid: {e}")));
        }
        if self.anonymous_limit == 0 || self.anonymous_limit > self.authenticated_limit {
            return Err(SearchError::Config(
                "anonymous_limit must be > 0 and <= authenticated_limit".into(),
            ));
        }
        if self.timeout_seconds == Some(0) {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }

    /// The quota that applies for the current credential state.
    pub fn limit_for(&self, has_credential: bool) -> u32 {
        if has_credential {
            self.authenticated_limit
        } else {
            self.anonymous_limit
        }
    }

    /// Cache TTL in milliseconds.
    pub fn cache_ttl_ms(&self) -> i64 {
        i64::try_from(self.cache_ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

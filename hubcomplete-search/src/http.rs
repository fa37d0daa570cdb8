//! GitHub REST client for the two search endpoints.
//!
//! Provides a configured [`reqwest::Client`] with the v3 `Accept` header and
//! the configured User-Agent, and a [`GitHubClient`] that feeds quota headers
//! into the shared [`RateLimitTracker`] after every completed call.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::backend::SearchBackend;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::rate_limit::{QuotaHeaders, RateLimitTracker};
use crate::types::{RepositoryHit, SearchPage, UserHit};

/// Media type requested from the API.
pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

/// Build a [`reqwest::Client`] configured for the GitHub API.
///
/// The client has:
/// - `Accept: application/vnd.github.v3+json` on every request
/// - The User-Agent from config
/// - A request timeout only when `timeout_seconds` is set
///
/// # Errors
///
/// Returns [`SearchError::Config`] if the client cannot be constructed.
pub fn build_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));

    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers);
    if let Some(secs) = config.timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    builder
        .build()
        .map_err(|e| SearchError::Config(format!("failed to build HTTP client: {e}")))
}

/// Read the three quota headers. All three must be present and numeric.
pub fn quota_from_headers(headers: &HeaderMap) -> Option<QuotaHeaders> {
    fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    }

    Some(QuotaHeaders {
        limit: parse(headers, HEADER_LIMIT)?,
        remaining: parse(headers, HEADER_REMAINING)?,
        reset: parse(headers, HEADER_RESET)?,
    })
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Search backend talking to the GitHub REST API.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: url::Url,
    per_page: u32,
    credential: RwLock<Option<String>>,
    tracker: Arc<RateLimitTracker>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url.as_str())
            .field("per_page", &self.per_page)
            .field("has_credential", &self.credential().is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client for `config.base_url` reporting quota to `tracker`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the base URL does not parse or the
    /// HTTP client cannot be built.
    pub fn new(config: &SearchConfig, tracker: Arc<RateLimitTracker>) -> Result<Self, SearchError> {
        let base_url = url::Url::parse(&config.base_url)
            .map_err(|e| SearchError::Config(format!("base_url is invalid: {e}")))?;
        Ok(Self {
            client: build_client(config)?,
            base_url,
            per_page: config.per_page,
            credential: RwLock::new(
                config
                    .credential
                    .clone()
                    .filter(|c| !c.trim().is_empty()),
            ),
            tracker,
        })
    }

    /// The tracker this client reports to.
    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    fn credential(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<url::Url, SearchError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = url::Url::parse(&format!("{base}{path}"))
            .map_err(|e| SearchError::Config(format!("invalid endpoint {path}: {e}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Issue a GET, record quota, and decode a 2xx body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<T, SearchError> {
        let url = self.endpoint(path, params)?;
        let mut request = self.client.get(url);
        if let Some(token) = self.credential() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let quota = quota_from_headers(response.headers());
        self.tracker.record_response(quota, path.contains("/search/"));

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Error fetching {what}: {}", status.as_u16()));
            tracing::debug!(status = status.as_u16(), %message, "search endpoint returned error");
            return Err(SearchError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                SearchError::Parse(e.to_string())
            } else {
                SearchError::Network(e.to_string())
            }
        })
    }
}

impl SearchBackend for GitHubClient {
    async fn search_repositories(
        &self,
        query: &str,
    ) -> Result<SearchPage<RepositoryHit>, SearchError> {
        let per_page = self.per_page.to_string();
        self.get_json(
            "/search/repositories",
            &[
                ("q", query),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ],
            "repositories",
        )
        .await
    }

    async fn search_users(&self, query: &str) -> Result<SearchPage<UserHit>, SearchError> {
        self.get_json("/search/users", &[("q", query)], "users")
            .await
    }

    fn set_credential(&self, credential: Option<String>) {
        let credential = credential.filter(|c| !c.trim().is_empty());
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = credential;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::QuotaSettings;
    use crate::storage::MemoryStore;

    fn tracker() -> Arc<RateLimitTracker> {
        Arc::new(RateLimitTracker::load(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(0)),
            QuotaSettings::default(),
        ))
    }

    #[test]
    fn build_client_with_default_config() {
        assert!(build_client(&SearchConfig::default()).is_ok());
    }

    #[test]
    fn build_client_with_timeout() {
        let config = SearchConfig {
            timeout_seconds: Some(5),
            ..Default::default()
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn quota_headers_require_all_three() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_LIMIT, HeaderValue::from_static("30"));
        headers.insert(HEADER_REMAINING, HeaderValue::from_static("29"));
        assert_eq!(quota_from_headers(&headers), None);

        headers.insert(HEADER_RESET, HeaderValue::from_static("1700000060"));
        assert_eq!(
            quota_from_headers(&headers),
            Some(QuotaHeaders {
                limit: 30,
                remaining: 29,
                reset: 1_700_000_060,
            })
        );
    }

    #[test]
    fn non_numeric_quota_header_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_LIMIT, HeaderValue::from_static("lots"));
        headers.insert(HEADER_REMAINING, HeaderValue::from_static("1"));
        headers.insert(HEADER_RESET, HeaderValue::from_static("1"));
        assert_eq!(quota_from_headers(&headers), None);
    }

    #[test]
    fn endpoint_encodes_query() {
        let client = GitHubClient::new(&SearchConfig::default(), tracker()).expect("client");
        let url = client
            .endpoint("/search/users", &[("q", "c++ lang")])
            .expect("url");
        assert_eq!(url.path(), "/search/users");
        assert_eq!(url.query(), Some("q=c%2B%2B+lang"));
    }

    #[test]
    fn base_url_with_path_prefix_is_kept() {
        let config = SearchConfig {
            base_url: "http://127.0.0.1:9/api/v3/".into(),
            ..Default::default()
        };
        let client = GitHubClient::new(&config, tracker()).expect("client");
        let url = client.endpoint("/search/users", &[]).expect("url");
        assert_eq!(url.path(), "/api/v3/search/users");
    }

    #[test]
    fn blank_credential_is_cleared() {
        let client = GitHubClient::new(&SearchConfig::default(), tracker()).expect("client");
        client.set_credential(Some("ghp_abc".into()));
        assert_eq!(client.credential().as_deref(), Some("ghp_abc"));
        client.set_credential(Some("  ".into()));
        assert_eq!(client.credential(), None);
    }
}

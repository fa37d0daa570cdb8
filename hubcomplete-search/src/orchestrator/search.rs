//! Core search orchestrator: quota gate, cache, remote fan-out, merge, fallback.
//!
//! Composes the [`ResultCache`], the shared [`RateLimitTracker`], the
//! [`FallbackCatalog`] and a [`SearchBackend`] into a single `search` call.

use std::sync::Arc;

use crate::backend::SearchBackend;
use crate::cache::ResultCache;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::fallback::FallbackCatalog;
use crate::http::GitHubClient;
use crate::rate_limit::RateLimitTracker;
use crate::types::{ResultItem, SearchPage, UserHit};

use super::merge::merge_results;

/// Runs committed queries against the backend.
pub struct SearchOrchestrator<B: SearchBackend = GitHubClient> {
    backend: B,
    cache: ResultCache,
    tracker: Arc<RateLimitTracker>,
    fallback: FallbackCatalog,
    config: SearchConfig,
}

impl<B: SearchBackend> std::fmt::Debug for SearchOrchestrator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("cache", &self.cache)
            .field("tracker", &self.tracker)
            .field("fallback_keys", &self.fallback.len())
            .finish_non_exhaustive()
    }
}

impl<B: SearchBackend> SearchOrchestrator<B> {
    pub fn new(
        backend: B,
        cache: ResultCache,
        tracker: Arc<RateLimitTracker>,
        fallback: FallbackCatalog,
        config: SearchConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            tracker,
            fallback,
            config,
        }
    }

    /// Run one committed query.
    ///
    /// # Pipeline
    ///
    /// 1. Reject queries shorter than `min_chars` (after trimming)
    /// 2. If the quota is exhausted, answer from the fallback catalog only
    /// 3. Answer from the cache when a valid entry exists
    /// 4. Search repositories, plus users when the query is short or the
    ///    repository page is sparse
    /// 5. Merge, cap at `max_results`, and cache the merged list
    /// 6. On failure, latch the tracker for rate-limit errors and try the
    ///    fallback catalog once before surfacing the error
    ///
    /// # Errors
    ///
    /// - [`SearchError::QueryTooShort`] for gated queries
    /// - [`SearchError::RateLimitExceeded`] when the quota is exhausted and
    ///   no fallback matches
    /// - Any backend error when the live search failed and no fallback matches
    pub async fn search(&self, query: &str) -> Result<Vec<ResultItem>, SearchError> {
        let query = query.trim();
        if query.chars().count() < self.config.min_chars {
            return Err(SearchError::QueryTooShort {
                min_chars: self.config.min_chars,
            });
        }

        if self.tracker.is_exceeded() {
            let fallback = self.fallback.get(query);
            if fallback.is_empty() {
                return Err(SearchError::RateLimitExceeded);
            }
            tracing::debug!(count = fallback.len(), "quota exhausted; serving fallback");
            return Ok(fallback);
        }

        if let Some(cached) = self.cache.get(query) {
            tracing::debug!(count = cached.len(), "serving cached results");
            return Ok(cached);
        }

        match self.fetch_and_merge(query).await {
            Ok(results) => {
                self.cache.put(query, &results);
                Ok(results)
            }
            Err(err) => {
                let err = if err.is_rate_limit() {
                    self.tracker.record_rate_limit_error();
                    SearchError::RateLimitExceeded
                } else {
                    err
                };

                let fallback = self.fallback.get(query);
                if fallback.is_empty() {
                    tracing::warn!(error = %err, "search failed");
                    return Err(err);
                }
                tracing::warn!(error = %err, count = fallback.len(), "search failed; serving fallback");
                Ok(fallback)
            }
        }
    }

    /// Attach or clear the bearer credential and adjust the quota to match.
    pub fn configure_credential(&self, credential: Option<String>) {
        let credential = credential
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());
        let has_credential = credential.is_some();
        self.backend.set_credential(credential);
        self.tracker.configure_credential(has_credential);
    }

    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn fetch_and_merge(&self, query: &str) -> Result<Vec<ResultItem>, SearchError> {
        let short = query.chars().count() < self.config.short_query_chars;

        let (repos, users) = if short {
            let (repos, users) = futures::join!(
                self.backend.search_repositories(query),
                self.backend.search_users(query)
            );
            (repos?, self.supplementary_users(users))
        } else {
            let repos = self.backend.search_repositories(query).await?;
            let users = if repos.items.len() >= self.config.sparse_threshold {
                Vec::new()
            } else if self.tracker.is_exceeded() {
                tracing::debug!("skipping user search; quota exhausted");
                Vec::new()
            } else {
                self.supplementary_users(self.backend.search_users(query).await)
            };
            (repos, users)
        };

        let merged = merge_results(&repos.items, &users, self.config.max_results);
        tracing::debug!(
            repos = repos.items.len(),
            users = users.len(),
            merged = merged.len(),
            "search merged"
        );
        Ok(merged)
    }

    /// A failed user search never fails the whole query.
    fn supplementary_users(&self, outcome: Result<SearchPage<UserHit>, SearchError>) -> Vec<UserHit> {
        match outcome {
            Ok(page) => page.items,
            Err(err) => {
                if err.is_rate_limit() {
                    self.tracker.record_rate_limit_error();
                }
                tracing::warn!(error = %err, "user search failed; continuing with repository results");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::QuotaSettings;
    use crate::storage::MemoryStore;
    use crate::types::RepositoryHit;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-process backend that records calls and decrements the tracker
    /// like a header-less provider would.
    struct MockBackend {
        repos: Result<Vec<RepositoryHit>, SearchError>,
        users: Result<Vec<UserHit>, SearchError>,
        tracker: Arc<RateLimitTracker>,
        repo_calls: AtomicUsize,
        user_calls: AtomicUsize,
        credential: Mutex<Option<String>>,
    }

    impl MockBackend {
        fn new(tracker: Arc<RateLimitTracker>) -> Self {
            Self {
                repos: Ok(Vec::new()),
                users: Ok(Vec::new()),
                tracker,
                repo_calls: AtomicUsize::new(0),
                user_calls: AtomicUsize::new(0),
                credential: Mutex::new(None),
            }
        }

        fn page<T: Clone>(items: &[T]) -> SearchPage<T> {
            SearchPage {
                total_count: items.len() as u64,
                incomplete_results: false,
                items: items.to_vec(),
            }
        }
    }

    impl SearchBackend for MockBackend {
        async fn search_repositories(
            &self,
            _query: &str,
        ) -> Result<SearchPage<RepositoryHit>, SearchError> {
            self.repo_calls.fetch_add(1, Ordering::SeqCst);
            self.tracker.record_response(None, true);
            self.repos.as_ref().map(|r| Self::page(r)).map_err(Clone::clone)
        }

        async fn search_users(&self, _query: &str) -> Result<SearchPage<UserHit>, SearchError> {
            self.user_calls.fetch_add(1, Ordering::SeqCst);
            self.tracker.record_response(None, true);
            self.users.as_ref().map(|u| Self::page(u)).map_err(Clone::clone)
        }

        fn set_credential(&self, credential: Option<String>) {
            *self.credential.lock().unwrap() = credential;
        }
    }

    fn user(id: u64, login: &str) -> UserHit {
        UserHit {
            id,
            login: login.into(),
            html_url: format!("https://github.com/{login}"),
            avatar_url: String::new(),
        }
    }

    fn repos(n: u64) -> Vec<RepositoryHit> {
        (0..n)
            .map(|i| RepositoryHit {
                id: i,
                name: format!("repo{i}"),
                full_name: format!("owner{i}/repo{i}"),
                html_url: format!("https://github.com/owner{i}/repo{i}"),
                description: None,
                stargazers_count: 100 - i,
                owner: user(1000 + i, &format!("owner{i}")),
            })
            .collect()
    }

    struct Harness {
        orchestrator: SearchOrchestrator<MockBackend>,
        tracker: Arc<RateLimitTracker>,
    }

    fn harness(configure: impl FnOnce(&mut MockBackend)) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = SearchConfig::default();
        let tracker = Arc::new(RateLimitTracker::load(
            store.clone(),
            clock.clone(),
            QuotaSettings::from(&config),
        ));
        let cache = ResultCache::new(store, clock, config.cache_ttl_ms());
        let mut backend = MockBackend::new(Arc::clone(&tracker));
        configure(&mut backend);
        Harness {
            orchestrator: SearchOrchestrator::new(
                backend,
                cache,
                Arc::clone(&tracker),
                FallbackCatalog::builtin(),
                config,
            ),
            tracker,
        }
    }

    fn calls(h: &Harness) -> (usize, usize) {
        let backend = h.orchestrator.backend();
        (
            backend.repo_calls.load(Ordering::SeqCst),
            backend.user_calls.load(Ordering::SeqCst),
        )
    }

    #[tokio::test]
    async fn short_query_rejected_without_network() {
        let h = harness(|_| {});
        let err = h.orchestrator.search("  ab  ").await.unwrap_err();
        assert!(matches!(err, SearchError::QueryTooShort { min_chars: 3 }));
        assert_eq!(calls(&h), (0, 0));
    }

    #[tokio::test]
    async fn dense_long_query_skips_user_search() {
        let h = harness(|b| b.repos = Ok(repos(10)));
        let results = h.orchestrator.search("tokio").await.expect("results");
        assert_eq!(results.len(), 20);
        assert_eq!(calls(&h), (1, 0));
    }

    #[tokio::test]
    async fn sparse_repositories_add_user_search() {
        let h = harness(|b| {
            b.repos = Ok(repos(2));
            b.users = Ok(vec![user(1, "tokio-rs"), user(1000, "owner0")]);
        });
        let results = h.orchestrator.search("tokio").await.expect("results");
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["repo0", "repo1", "owner0", "owner1", "tokio-rs"]);
        assert_eq!(calls(&h), (1, 1));
    }

    #[tokio::test]
    async fn short_query_runs_both_searches() {
        let h = harness(|b| b.repos = Ok(repos(20)));
        h.orchestrator.search("vue").await.expect("results");
        assert_eq!(calls(&h), (1, 1));
    }

    #[tokio::test]
    async fn user_search_failure_keeps_repository_results() {
        let h = harness(|b| {
            b.repos = Ok(repos(1));
            b.users = Err(SearchError::Remote {
                status: 500,
                message: "Server Error".into(),
            });
        });
        let results = h.orchestrator.search("tokio").await.expect("results");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn cache_hit_skips_backend_and_tracker() {
        let h = harness(|b| b.repos = Ok(repos(10)));
        let first = h.orchestrator.search("tokio").await.expect("first");
        let remaining = h.tracker.snapshot().remaining;

        let second = h.orchestrator.search("  TOKIO ").await.expect("second");
        assert_eq!(first, second);
        assert_eq!(calls(&h), (1, 0));
        assert_eq!(h.tracker.snapshot().remaining, remaining);
    }

    #[tokio::test]
    async fn exceeded_tracker_serves_fallback_without_network() {
        let h = harness(|_| {});
        h.tracker.record_rate_limit_error();
        let results = h.orchestrator.search("react").await.expect("fallback");
        assert_eq!(results.len(), 3);
        assert_eq!(calls(&h), (0, 0));
    }

    #[tokio::test]
    async fn exceeded_tracker_without_fallback_errors() {
        let h = harness(|_| {});
        h.tracker.record_rate_limit_error();
        let err = h.orchestrator.search("xyz").await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn rate_limit_error_latches_and_consults_fallback() {
        let h = harness(|b| {
            b.repos = Err(SearchError::Remote {
                status: 403,
                message: "API rate limit exceeded for 127.0.0.1".into(),
            })
        });
        let err = h.orchestrator.search("error").await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimitExceeded));
        assert!(h.tracker.is_exceeded());
    }

    #[tokio::test]
    async fn transient_failure_served_from_fallback() {
        let h = harness(|b| b.repos = Err(SearchError::Network("connection reset".into())));
        let results = h.orchestrator.search("react hooks").await.expect("fallback");
        assert_eq!(results[0].id, "repo-10270250");
        assert!(!h.tracker.is_exceeded());
    }

    #[tokio::test]
    async fn transient_failure_without_fallback_surfaces() {
        let h = harness(|b| b.repos = Err(SearchError::Network("connection reset".into())));
        let err = h.orchestrator.search("zig").await.unwrap_err();
        assert!(matches!(err, SearchError::Network(_)));
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let h = harness(|_| {});
        let results = h.orchestrator.search("xyz").await.expect("empty ok");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn credential_forwarded_and_limit_raised() {
        let h = harness(|_| {});
        h.orchestrator.configure_credential(Some(" ghp_token ".into()));
        assert_eq!(
            h.orchestrator.backend().credential.lock().unwrap().as_deref(),
            Some("ghp_token")
        );
        assert_eq!(h.tracker.snapshot().limit, 30);

        h.orchestrator.configure_credential(Some(String::new()));
        assert_eq!(*h.orchestrator.backend().credential.lock().unwrap(), None);
        assert_eq!(h.tracker.snapshot().limit, 10);
    }
}

//! Persisted TTL cache for merged search results.
//!
//! Each query is stored under `github-search-<normalised query>` as
//! `{timestamp, results}`. Expired and corrupt entries are purged when read.
//! Every persistence failure is logged and swallowed: caching is an
//! optimisation, never a reason for a search to fail.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::SearchError;
use crate::storage::KeyValueStore;
use crate::types::ResultItem;

/// Namespace prefix for cache keys in the shared store.
pub const CACHE_KEY_PREFIX: &str = "github-search-";

/// Persisted form of one cached query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When the entry was written, in epoch milliseconds.
    pub timestamp: i64,
    /// Results exactly as they were returned to the caller.
    pub results: Vec<ResultItem>,
}

impl CacheEntry {
    /// An entry is valid while `now - timestamp < ttl`.
    pub fn is_valid(&self, now_millis: i64, ttl_millis: i64) -> bool {
        now_millis.saturating_sub(self.timestamp) < ttl_millis
    }
}

/// Build the store key for a query.
///
/// The query is trimmed and lowercased so `" React "` and `"react"` share
/// an entry.
pub fn cache_key(query: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{}", query.trim().to_lowercase())
}

/// TTL-bounded result cache over a [`KeyValueStore`].
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_millis: i64,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl_millis", &self.ttl_millis)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl_millis: i64) -> Self {
        Self {
            store,
            clock,
            ttl_millis,
        }
    }

    /// Look up cached results for `query`.
    ///
    /// Returns `None` on miss, on expiry (the entry is removed), on a corrupt
    /// entry (also removed), and when the store is unavailable.
    pub fn get(&self, query: &str) -> Option<Vec<ResultItem>> {
        let key = cache_key(query);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed");
                return None;
            }
        };

        let entry = match decode_entry(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unreadable cache entry");
                self.purge(&key);
                return None;
            }
        };

        if !entry.is_valid(self.clock.now_millis(), self.ttl_millis) {
            tracing::debug!("cache entry expired");
            self.purge(&key);
            return None;
        }

        tracing::trace!(count = entry.results.len(), "cache hit");
        Some(entry.results)
    }

    /// Store `results` for `query`, replacing any previous entry.
    pub fn put(&self, query: &str, results: &[ResultItem]) {
        let entry = CacheEntry {
            timestamp: self.clock.now_millis(),
            results: results.to_vec(),
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode cache entry");
                return;
            }
        };
        if let Err(e) = self.store.set(&cache_key(query), &json) {
            tracing::warn!(error = %e, "cache write failed");
        }
    }

    /// Remove every cached query. Other keys in the store are left alone.
    pub fn clear(&self) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list cache entries");
                return;
            }
        };
        for key in keys.iter().filter(|k| k.starts_with(CACHE_KEY_PREFIX)) {
            self.purge(key);
        }
    }

    fn purge(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(error = %e, "cache purge failed");
        }
    }
}

fn decode_entry(raw: &str) -> Result<CacheEntry, SearchError> {
    serde_json::from_str(raw).map_err(|e| SearchError::CacheCorrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::types::ResultKind;

    const DAY_MS: i64 = 86_400_000;

    fn item(id: u64, name: &str) -> ResultItem {
        ResultItem {
            id: format!("repo-{id}"),
            name: name.into(),
            kind: ResultKind::Repository,
            url: format!("https://github.com/x/{name}"),
            avatar_url: "https://avatars.example/x".into(),
            description: Some(format!("{name} description")),
        }
    }

    fn setup() -> (ResultCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = ResultCache::new(store.clone(), clock.clone(), DAY_MS);
        (cache, store, clock)
    }

    /// A store that fails every operation.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, SearchError> {
            Err(SearchError::StorageUnavailable("disabled".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), SearchError> {
            Err(SearchError::StorageUnavailable("quota exceeded".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), SearchError> {
            Err(SearchError::StorageUnavailable("disabled".into()))
        }
        fn keys(&self) -> Result<Vec<String>, SearchError> {
            Err(SearchError::StorageUnavailable("disabled".into()))
        }
    }

    #[test]
    fn cache_key_normalises_case_and_whitespace() {
        assert_eq!(cache_key("  React "), "github-search-react");
        assert_eq!(cache_key("react"), cache_key("REACT"));
    }

    #[test]
    fn put_then_get_returns_same_results() {
        let (cache, _, _) = setup();
        let results = vec![item(1, "react"), item(2, "react-dom")];
        cache.put("react", &results);
        assert_eq!(cache.get("react"), Some(results));
    }

    #[test]
    fn miss_returns_none() {
        let (cache, _, _) = setup();
        assert!(cache.get("nothing-here").is_none());
    }

    #[test]
    fn fresh_entry_written_one_second_ago_is_returned_unchanged() {
        let (cache, store, clock) = setup();
        let results = vec![item(1, "react"), item(2, "react-native"), item(3, "redux")];
        let entry = CacheEntry {
            timestamp: clock.now_millis() - 1000,
            results: results.clone(),
        };
        store
            .set(&cache_key("react"), &serde_json::to_string(&entry).expect("json"))
            .expect("set");

        let cached = cache.get("react").expect("should be cached");
        assert_eq!(cached.len(), 3);
        assert_eq!(cached, results);
    }

    #[test]
    fn expired_entry_is_purged() {
        let (cache, store, clock) = setup();
        cache.put("react", &[item(1, "react")]);

        clock.advance_millis(DAY_MS);
        assert!(cache.get("react").is_none());
        assert_eq!(store.get(&cache_key("react")).expect("get"), None);
    }

    #[test]
    fn entry_just_inside_ttl_is_valid() {
        let (cache, _, clock) = setup();
        cache.put("react", &[item(1, "react")]);
        clock.advance_millis(DAY_MS - 1);
        assert!(cache.get("react").is_some());
    }

    #[test]
    fn corrupt_entry_is_a_miss_and_removed() {
        let (cache, store, _) = setup();
        store.set(&cache_key("react"), "{not json").expect("set");
        assert!(cache.get("react").is_none());
        assert_eq!(store.get(&cache_key("react")).expect("get"), None);
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let (cache, _, _) = setup();
        cache.put("react", &[item(1, "old")]);
        cache.put("react", &[item(2, "new")]);
        let cached = cache.get("react").expect("cached");
        assert_eq!(cached[0].name, "new");
    }

    #[test]
    fn broken_store_degrades_to_no_op() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResultCache::new(Arc::new(BrokenStore), clock, DAY_MS);
        cache.put("react", &[item(1, "react")]);
        assert!(cache.get("react").is_none());
        cache.clear();
    }

    #[test]
    fn clear_removes_only_cache_entries() {
        let (cache, store, _) = setup();
        cache.put("react", &[item(1, "react")]);
        cache.put("vue", &[item(2, "vue")]);
        store.set("github_rate_limit_info", "{}").expect("set");

        cache.clear();

        assert!(cache.get("react").is_none());
        assert!(cache.get("vue").is_none());
        assert!(store.get("github_rate_limit_info").expect("get").is_some());
    }
}

//! # hubcomplete-search
//!
//! Search-as-you-type engine for GitHub users and repositories.
//!
//! This crate sits between keystrokes and the GitHub search REST API. It
//! decides when a query is worth sending, whether it may be sent at all, and
//! what to show when it cannot be.
//!
//! ## Design
//!
//! - [`debounce`] commits input values at most every `debounce_ms`, earlier
//!   after `typing_threshold_ms` of silence
//! - [`cache`] keeps merged results for 24 hours in a [`storage::KeyValueStore`]
//! - [`rate_limit`] mirrors the provider quota, persists it, and clears the
//!   exceeded latch once the reset time passes
//! - [`fallback`] holds canned results for popular queries
//! - [`orchestrator`] composes the above with the HTTP [`http::GitHubClient`]
//! - [`selection`] is the dropdown/highlight reducer the UI layer renders from
//!
//! ## Security
//!
//! - The bearer credential is never logged
//! - Search queries are logged only at debug/trace level

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod fallback;
pub mod http;
pub mod orchestrator;
pub mod rate_limit;
pub mod selection;
pub mod storage;
pub mod types;

use std::sync::Arc;

pub use backend::SearchBackend;
pub use cache::ResultCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SearchConfig;
pub use debounce::{DebounceSettings, TypingAwareDebouncer};
pub use error::{Result, SearchError};
pub use fallback::FallbackCatalog;
pub use http::GitHubClient;
pub use orchestrator::SearchOrchestrator;
pub use rate_limit::{QuotaSettings, RateLimitSnapshot, RateLimitTracker, Subscription};
pub use selection::{Phase, SelectionEvent, SelectionState};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use types::{ResultItem, ResultKind};

/// Build a GitHub-backed orchestrator over `store`.
///
/// Loads the rate-limit tracker from `store`, raises its limit when a
/// credential is configured and the persisted quota is still anonymous, and
/// uses the built-in fallback catalog. The tracker's reset
/// check is not started; call [`RateLimitTracker::start_reset_check`] from
/// inside a tokio runtime.
///
/// # Errors
///
/// Returns [`SearchError::Config`] if `config` fails validation or the HTTP
/// client cannot be built.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> hubcomplete_search::Result<()> {
/// use std::sync::Arc;
/// use hubcomplete_search::{MemoryStore, SearchConfig, SystemClock};
///
/// let orchestrator = hubcomplete_search::build_orchestrator(
///     &SearchConfig::default(),
///     Arc::new(MemoryStore::new()),
///     Arc::new(SystemClock),
/// )?;
/// orchestrator.tracker().start_reset_check();
/// for item in orchestrator.search("tokio").await? {
///     println!("{} {}", item.kind, item.url);
/// }
/// # Ok(())
/// # }
/// ```
pub fn build_orchestrator(
    config: &SearchConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
) -> Result<SearchOrchestrator> {
    config.validate()?;

    let tracker = Arc::new(RateLimitTracker::load(
        Arc::clone(&store),
        Arc::clone(&clock),
        QuotaSettings::from(config),
    ));
    let cache = ResultCache::new(store, clock, config.cache_ttl_ms());
    let client = GitHubClient::new(config, Arc::clone(&tracker))?;

    let orchestrator = SearchOrchestrator::new(
        client,
        cache,
        tracker,
        FallbackCatalog::builtin(),
        config.clone(),
    );
    let has_credential = config
        .credential
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    if has_credential && orchestrator.tracker().snapshot().limit < config.authenticated_limit {
        orchestrator.tracker().configure_credential(true);
    }
    Ok(orchestrator)
}

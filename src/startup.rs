//! Startup wiring: open the persistent store and build the shared orchestrator.
//!
//! Call [`initialize`] once per process from inside a tokio runtime. The
//! returned orchestrator already has its rate-limit reset check running.

use std::path::Path;
use std::sync::Arc;

use hubcomplete_search::{Clock, FileStore, KeyValueStore, SearchOrchestrator, SystemClock};

use crate::config::AppConfig;
use crate::error::Result;

/// Build the orchestrator described by `config` over the on-disk store.
///
/// # Errors
///
/// Returns an error if the config is invalid, the store directory cannot be
/// created, or the HTTP client cannot be built.
pub fn initialize(config: &AppConfig) -> Result<Arc<SearchOrchestrator>> {
    config.validate()?;
    let store_dir = config.storage.resolved_dir();
    initialize_with_store(config, &store_dir)
}

/// Same as [`initialize`] with an explicit store directory.
///
/// # Errors
///
/// See [`initialize`].
pub fn initialize_with_store(
    config: &AppConfig,
    store_dir: &Path,
) -> Result<Arc<SearchOrchestrator>> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(store_dir)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let orchestrator = hubcomplete_search::build_orchestrator(&config.search, store, clock)?;

    orchestrator.tracker().start_reset_check();

    let snapshot = orchestrator.tracker().snapshot();
    tracing::info!(
        store = %store_dir.display(),
        authenticated = config.search.credential.is_some(),
        limit = snapshot.limit,
        remaining = snapshot.remaining,
        exceeded = snapshot.is_exceeded(),
        "search engine initialized"
    );
    Ok(Arc::new(orchestrator))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::AppError;
    use hubcomplete_search::SearchError;

    #[tokio::test]
    async fn initialize_starts_reset_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orchestrator =
            initialize_with_store(&AppConfig::default(), dir.path()).expect("initialize");
        assert!(orchestrator.tracker().reset_check_running());
        assert!(dir.path().is_dir());
    }

    #[tokio::test]
    async fn initialize_honours_configured_store_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.storage.data_dir = Some(dir.path().join("nested").join("store"));
        let orchestrator = initialize(&config).expect("initialize");
        orchestrator.tracker().record_response(None, true);
        assert!(dir.path().join("nested").join("store").is_dir());
    }

    #[test]
    fn initialize_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.search.per_page = 0;
        let err = initialize(&config).unwrap_err();
        assert!(matches!(err, AppError::Search(SearchError::Config(_))));
    }
}

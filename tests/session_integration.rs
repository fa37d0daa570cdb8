//! End-to-end session behaviour over an in-process backend with paused time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hubcomplete::{Key, SearchSession};
use hubcomplete_search::types::{RepositoryHit, SearchPage, UserHit};
use hubcomplete_search::{
    FallbackCatalog, KeyValueStore, MemoryStore, Phase, QuotaSettings, RateLimitTracker,
    ResultCache, ResultItem, SearchBackend, SearchConfig, SearchError, SearchOrchestrator,
    SystemClock,
};

// ── Test backend ─────────────────────────────────────────────────────────────

/// Answers every query with three repositories named after it, after a
/// per-query delay. Queries starting with `boom` fail.
#[derive(Clone, Default)]
struct ScriptedBackend {
    delays: Arc<HashMap<String, Duration>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    fn with_delays(delays: &[(&str, u64)]) -> Self {
        Self {
            delays: Arc::new(
                delays
                    .iter()
                    .map(|(q, ms)| ((*q).to_owned(), Duration::from_millis(*ms)))
                    .collect(),
            ),
            queries: Arc::default(),
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("queries").clone()
    }
}

fn repo(id: u64, name: &str) -> RepositoryHit {
    RepositoryHit {
        id,
        name: name.to_owned(),
        full_name: format!("owner{id}/{name}"),
        html_url: format!("https://github.com/owner{id}/{name}"),
        description: None,
        stargazers_count: 0,
        owner: UserHit {
            id: 1000 + id,
            login: format!("owner{id}"),
            html_url: format!("https://github.com/owner{id}"),
            avatar_url: String::new(),
        },
    }
}

impl SearchBackend for ScriptedBackend {
    async fn search_repositories(
        &self,
        query: &str,
    ) -> Result<SearchPage<RepositoryHit>, SearchError> {
        self.queries.lock().expect("queries").push(query.to_owned());
        let delay = self
            .delays
            .get(query)
            .copied()
            .unwrap_or(Duration::from_millis(20));
        tokio::time::sleep(delay).await;

        if query.starts_with("boom") {
            return Err(SearchError::Remote {
                status: 500,
                message: "boom".into(),
            });
        }
        let items: Vec<_> = (1..=3).map(|i| repo(i, &format!("{query}-{i}"))).collect();
        Ok(SearchPage {
            total_count: items.len() as u64,
            incomplete_results: false,
            items,
        })
    }

    async fn search_users(&self, _query: &str) -> Result<SearchPage<UserHit>, SearchError> {
        Ok(SearchPage {
            total_count: 0,
            incomplete_results: false,
            items: Vec::new(),
        })
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────────

struct Fixture {
    session: SearchSession<ScriptedBackend>,
    backend: ScriptedBackend,
    selected: Arc<Mutex<Vec<ResultItem>>>,
}

fn fixture(backend: ScriptedBackend) -> Fixture {
    let config = SearchConfig::default();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(SystemClock);
    let tracker = Arc::new(RateLimitTracker::load(
        Arc::clone(&store),
        clock.clone(),
        QuotaSettings::from(&config),
    ));
    let cache = ResultCache::new(store, clock, config.cache_ttl_ms());
    let orchestrator = Arc::new(SearchOrchestrator::new(
        backend.clone(),
        cache,
        tracker,
        FallbackCatalog::builtin(),
        config,
    ));

    let selected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&selected);
    let session = SearchSession::spawn(orchestrator, move |item: &ResultItem| {
        sink.lock().expect("selected").push(item.clone());
    });
    Fixture {
        session,
        backend,
        selected,
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ── Debounce and gating ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn typing_burst_commits_one_search() {
    let f = fixture(ScriptedBackend::default());
    for value in ["r", "re", "rea", "reac", "react"] {
        f.session.input(value);
        sleep_ms(100).await;
    }
    sleep_ms(2_000).await;

    assert_eq!(f.backend.queries(), ["react"]);
    let state = f.session.state();
    assert_eq!(state.phase(), Phase::Ready);
    assert_eq!(state.results.len(), 3);
    assert_eq!(state.results[0].name, "react-1");
    assert!(state.dropdown_open);
}

#[tokio::test(start_paused = true)]
async fn short_query_never_searches() {
    let f = fixture(ScriptedBackend::default());
    f.session.input("re");
    sleep_ms(2_000).await;

    assert!(f.backend.queries().is_empty());
    let state = f.session.state();
    assert_eq!(state.phase(), Phase::Gated);
    assert!(!state.dropdown_open);
}

#[tokio::test(start_paused = true)]
async fn shrinking_below_minimum_cancels_pending_commit() {
    let f = fixture(ScriptedBackend::default());
    f.session.input("tokio");
    sleep_ms(100).await;
    f.session.input("to");
    sleep_ms(2_000).await;

    assert!(f.backend.queries().is_empty());
    assert!(f.session.state().results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_query_is_served_from_cache() {
    let f = fixture(ScriptedBackend::default());
    f.session.input("serde");
    sleep_ms(1_000).await;
    f.session.input("serd");
    sleep_ms(1_000).await;
    f.session.input("serde");
    sleep_ms(1_000).await;

    assert_eq!(f.backend.queries(), ["serde", "serd"]);
    assert_eq!(f.session.state().results[0].name, "serde-1");
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn superseded_response_never_reaches_state() {
    let f = fixture(ScriptedBackend::with_delays(&[("slowq", 3_000), ("fastq", 10)]));
    let mut rx = f.session.watch();

    f.session.input("slowq");
    sleep_ms(600).await;
    assert_eq!(f.backend.queries(), ["slowq"]);
    assert!(f.session.state().is_loading);

    f.session.input("fastq");
    sleep_ms(5_000).await;

    assert_eq!(f.backend.queries(), ["slowq", "fastq"]);
    let state = f.session.state();
    assert_eq!(state.query, "fastq");
    assert!(!state.is_loading);
    assert!(state.results.iter().all(|r| r.name.starts_with("fastq")));

    // No intermediate state ever carried the slow results.
    let seen = rx.borrow_and_update().clone();
    assert!(seen.results.iter().all(|r| !r.name.starts_with("slowq")));
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_pending_and_in_flight_work() {
    let f = fixture(ScriptedBackend::with_delays(&[("react", 3_000)]));
    f.session.input("react");
    sleep_ms(600).await;
    assert_eq!(f.backend.queries(), ["react"]);

    f.session.reset();
    sleep_ms(5_000).await;

    let state = f.session.state();
    assert_eq!(state.phase(), Phase::Idle);
    assert!(state.results.is_empty());
    assert!(!state.is_loading);
}

// ── Selection ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn enter_invokes_navigation_callback() {
    let f = fixture(ScriptedBackend::default());
    f.session.input("axum");
    sleep_ms(1_000).await;

    assert_eq!(f.session.key(Key::Enter), None);
    f.session.key(Key::ArrowDown);
    f.session.key(Key::ArrowDown);
    let chosen = f.session.key(Key::Enter).expect("selection");

    assert_eq!(chosen.name, "axum-2");
    assert_eq!(*f.selected.lock().expect("selected"), vec![chosen]);
    assert!(f.session.state().dropdown_open);
}

#[tokio::test(start_paused = true)]
async fn choose_highlights_and_commits() {
    let f = fixture(ScriptedBackend::default());
    f.session.input("hyper");
    sleep_ms(1_000).await;

    let chosen = f.session.choose(2).expect("choose");
    assert_eq!(chosen.name, "hyper-3");
    assert_eq!(f.session.state().selected_index, Some(2));
    assert!(f.session.choose(9).is_err());
    assert_eq!(f.selected.lock().expect("selected").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn blur_and_focus_restore_view_without_searching() {
    let f = fixture(ScriptedBackend::default());
    f.session.input("tonic");
    sleep_ms(1_000).await;
    let before = f.session.state();

    f.session.blur();
    assert!(!f.session.state().dropdown_open);
    f.session.focus();
    sleep_ms(1_000).await;

    assert_eq!(f.session.state(), before);
    assert_eq!(f.backend.queries(), ["tonic"]);
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failure_shows_error_until_dismissed() {
    let f = fixture(ScriptedBackend::default());
    f.session.input("boomer");
    sleep_ms(1_000).await;

    let state = f.session.state();
    assert_eq!(state.phase(), Phase::Errored);
    assert_eq!(state.error.as_deref(), Some("Error: boom"));
    assert!(state.dropdown_open);

    f.session.dismiss_error();
    assert_eq!(f.session.state().error, None);
}

// ── Rate limit ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rate_limit_subscription_replays_and_resets() {
    let f = fixture(ScriptedBackend::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = f.session.subscribe_rate_limit(move |snapshot| {
        sink.lock().expect("seen").push(snapshot.remaining);
    });
    assert_eq!(*seen.lock().expect("seen"), vec![10]);

    f.session.orchestrator().tracker().record_rate_limit_error();
    assert!(f.session.orchestrator().tracker().is_exceeded());

    f.session.reset_rate_limit();
    assert!(!f.session.orchestrator().tracker().is_exceeded());
    assert_eq!(seen.lock().expect("seen").last(), Some(&10));
}

#[tokio::test(start_paused = true)]
async fn exceeded_quota_serves_fallback_without_calling_backend() {
    let f = fixture(ScriptedBackend::default());
    f.session.orchestrator().tracker().record_rate_limit_error();

    f.session.input("react");
    sleep_ms(1_000).await;

    assert!(f.backend.queries().is_empty());
    let state = f.session.state();
    assert_eq!(state.phase(), Phase::Ready);
    assert_eq!(state.results.len(), 3);
}

//! Per-session driver: keystrokes in, [`SelectionState`] out.
//!
//! A [`SearchSession`] feeds every input value through the typing-aware
//! debouncer and runs each committed value through the shared
//! [`SearchOrchestrator`]. Only the most recently committed query may update
//! the visible state: every commit bumps a monotonic request token and aborts
//! the previous in-flight task, and a result is applied only if its token is
//! still current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hubcomplete_search::{
    DebounceSettings, RateLimitSnapshot, ResultItem, SearchBackend, SearchOrchestrator,
    SelectionEvent, SelectionState, Subscription, TypingAwareDebouncer,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};

type SelectCallback = Box<dyn Fn(&ResultItem) + Send + Sync>;

/// Navigation keys the dropdown reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowDown,
    ArrowUp,
    Enter,
    Escape,
}

impl Key {
    /// Parse a DOM-style key name (`"ArrowDown"`, `"Enter"`, ...).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "ArrowDown" | "Down" => Some(Self::ArrowDown),
            "ArrowUp" | "Up" => Some(Self::ArrowUp),
            "Enter" => Some(Self::Enter),
            "Escape" | "Esc" => Some(Self::Escape),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArrowDown => "ArrowDown",
            Self::ArrowUp => "ArrowUp",
            Self::Enter => "Enter",
            Self::Escape => "Escape",
        }
    }

    fn event(self) -> SelectionEvent {
        match self {
            Self::ArrowDown => SelectionEvent::ArrowDown,
            Self::ArrowUp => SelectionEvent::ArrowUp,
            Self::Enter => SelectionEvent::Enter,
            Self::Escape => SelectionEvent::Escape,
        }
    }
}

struct Shared<B: SearchBackend> {
    orchestrator: Arc<SearchOrchestrator<B>>,
    state: watch::Sender<SelectionState>,
    token: AtomicU64,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    on_select: SelectCallback,
}

impl<B: SearchBackend + 'static> Shared<B> {
    fn apply(&self, event: SelectionEvent) -> Option<ResultItem> {
        let mut chosen = None;
        self.state.send_modify(|state| chosen = state.apply(event));
        chosen
    }

    /// Supersede whatever is in flight.
    fn invalidate(&self) -> u64 {
        let token = self.token.fetch_add(1, Ordering::SeqCst) + 1;
        self.abort_in_flight();
        token
    }

    fn abort_in_flight(&self) {
        if let Some(handle) = lock(&self.in_flight).take() {
            handle.abort();
        }
    }

    fn commit(self: &Arc<Self>, query: String) {
        // Gate check, token bump and loading flag happen under one state
        // write, so an input landing in between cannot slip past the gate.
        let mut started = None;
        self.state.send_if_modified(|state| {
            if !state.query_is_searchable() {
                return false;
            }
            started = Some(self.token.fetch_add(1, Ordering::SeqCst) + 1);
            state.apply(SelectionEvent::SearchStarted);
            true
        });
        let Some(token) = started else {
            tracing::trace!("dropping commit for gated input");
            return;
        };
        self.abort_in_flight();
        tracing::debug!(token, query_len = query.len(), "search committed");

        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let event = match shared.orchestrator.search(&query).await {
                Ok(results) => SelectionEvent::SearchSucceeded(results),
                Err(e) => {
                    tracing::debug!(token, error = %e, "search failed");
                    SelectionEvent::SearchFailed(e.user_message())
                }
            };
            let applied = shared.state.send_if_modified(|state| {
                if shared.token.load(Ordering::SeqCst) != token || !state.query_is_searchable() {
                    return false;
                }
                state.apply(event);
                true
            });
            if !applied {
                tracing::trace!(token, "discarded superseded search result");
            }
        });
        *lock(&self.in_flight) = Some(handle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One search box bound to a shared orchestrator.
///
/// Must be created inside a tokio runtime. Dropping the session stops the
/// debouncer and aborts any in-flight search.
pub struct SearchSession<B: SearchBackend + 'static = hubcomplete_search::GitHubClient> {
    shared: Arc<Shared<B>>,
    debouncer: TypingAwareDebouncer,
    pump: JoinHandle<()>,
}

impl<B: SearchBackend + 'static> std::fmt::Debug for SearchSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("state", &*self.shared.state.borrow())
            .field("token", &self.shared.token.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<B: SearchBackend + 'static> SearchSession<B> {
    /// Start a session. `on_select` runs when Enter commits a highlighted result.
    pub fn spawn<F>(orchestrator: Arc<SearchOrchestrator<B>>, on_select: F) -> Self
    where
        F: Fn(&ResultItem) + Send + Sync + 'static,
    {
        let settings = DebounceSettings::from(orchestrator.config());
        let min_chars = orchestrator.config().min_chars;
        let (state, _) = watch::channel(SelectionState::new(min_chars));
        let shared = Arc::new(Shared {
            orchestrator,
            state,
            token: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            on_select: Box::new(on_select),
        });

        let (debouncer, commits) = TypingAwareDebouncer::spawn(settings);
        let pump = tokio::spawn(pump(Arc::clone(&shared), commits));

        Self {
            shared,
            debouncer,
            pump,
        }
    }

    /// Feed the raw input value.
    ///
    /// Searchable values are debounced; anything shorter than `min_chars`
    /// cancels the pending commit and any in-flight search.
    pub fn input(&self, value: impl Into<String>) {
        let value = value.into();
        self.shared
            .apply(SelectionEvent::InputChanged(value.clone()));
        if self.shared.state.borrow().query_is_searchable() {
            self.debouncer.push(value);
        } else {
            self.debouncer.reset();
            self.shared.invalidate();
        }
    }

    /// Apply a navigation key. Returns the item committed by Enter, if any.
    pub fn key(&self, key: Key) -> Option<ResultItem> {
        let chosen = self.shared.apply(key.event());
        if let Some(item) = &chosen {
            tracing::debug!(id = %item.id, "result selected");
            (self.shared.on_select)(item);
        }
        chosen
    }

    /// Highlight the result under the pointer.
    pub fn hover(&self, index: usize) {
        self.shared.apply(SelectionEvent::Hover(index));
    }

    /// Pointer click on a result: highlight it and commit it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] if `index` is out of range or the
    /// dropdown is closed.
    pub fn choose(&self, index: usize) -> Result<ResultItem> {
        self.hover(index);
        if self.shared.state.borrow().selected_index != Some(index) {
            return Err(AppError::Command(format!("no result at index {index}")));
        }
        self.key(Key::Enter)
            .ok_or_else(|| AppError::Command("dropdown is closed".into()))
    }

    pub fn focus(&self) {
        self.shared.apply(SelectionEvent::Focus);
    }

    pub fn blur(&self) {
        self.shared.apply(SelectionEvent::Blur);
    }

    pub fn dismiss_error(&self) {
        self.shared.apply(SelectionEvent::DismissError);
    }

    /// Cancel pending work and return to the initial state.
    pub fn reset(&self) {
        self.debouncer.reset();
        self.shared.invalidate();
        self.shared.apply(SelectionEvent::Reset);
    }

    /// Set or clear the bearer credential for subsequent searches.
    pub fn configure_credential(&self, credential: Option<String>) {
        self.shared.orchestrator.configure_credential(credential);
    }

    /// Restore a fresh quota and clear the exceeded latch.
    pub fn reset_rate_limit(&self) {
        self.shared.orchestrator.tracker().reset();
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.shared.orchestrator.cache().clear();
    }

    /// Current view state.
    pub fn state(&self) -> SelectionState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<SelectionState> {
        self.shared.state.subscribe()
    }

    /// Observe the rate-limit snapshot; the current value is replayed at once.
    pub fn subscribe_rate_limit<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RateLimitSnapshot) + Send + Sync + 'static,
    {
        self.shared.orchestrator.tracker().subscribe(callback)
    }

    pub fn orchestrator(&self) -> &Arc<SearchOrchestrator<B>> {
        &self.shared.orchestrator
    }

    /// Stop the debouncer and abort in-flight work. The state is kept.
    pub fn shutdown(&self) {
        self.debouncer.shutdown();
        self.shared.invalidate();
        self.pump.abort();
    }
}

impl<B: SearchBackend + 'static> Drop for SearchSession<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump<B: SearchBackend + 'static>(
    shared: Arc<Shared<B>>,
    mut commits: mpsc::UnboundedReceiver<String>,
) {
    while let Some(query) = commits.recv().await {
        shared.commit(query);
    }
    tracing::trace!("session pump stopped");
}

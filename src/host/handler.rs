//! [`CommandHandler`] backed by a live [`SearchSession`].
//!
//! Besides answering commands, the handler publishes `state` after every
//! view change, `error` when a search fails, `rate_limit` whenever the quota
//! snapshot changes and `navigate` when a result is committed.

use std::sync::Arc;

use hubcomplete_search::clock::{Clock, SystemClock};
use hubcomplete_search::rate_limit::{format_countdown, format_reset_time};
use hubcomplete_search::{
    RateLimitSnapshot, ResultItem, SearchBackend, SearchOrchestrator, SelectionState, Subscription,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::host::channel::CommandHandler;
use crate::host::contract::{EventEnvelope, events};
use crate::session::{Key, SearchSession};

pub struct SessionHandler<B: SearchBackend + 'static = hubcomplete_search::GitHubClient> {
    session: SearchSession<B>,
    _rate_limit: Subscription,
    forwarder: JoinHandle<()>,
}

impl<B: SearchBackend + 'static> SessionHandler<B> {
    /// Start a session over `orchestrator` that publishes onto `event_tx`.
    ///
    /// Must be called inside a tokio runtime. Subscribe to `event_tx` first
    /// to observe the initial `state` and `rate_limit` events.
    pub fn spawn(
        orchestrator: Arc<SearchOrchestrator<B>>,
        event_tx: broadcast::Sender<EventEnvelope>,
    ) -> Self {
        let navigate_tx = event_tx.clone();
        let session = SearchSession::spawn(orchestrator, move |item| {
            emit(&navigate_tx, events::NAVIGATE, navigate_payload(item));
        });

        let rate_limit_tx = event_tx.clone();
        let rate_limit = session.subscribe_rate_limit(move |snapshot| {
            emit(
                &rate_limit_tx,
                events::RATE_LIMIT,
                rate_limit_payload(snapshot, SystemClock.now_secs()),
            );
        });

        let forwarder = tokio::spawn(forward_state(session.watch(), event_tx));

        Self {
            session,
            _rate_limit: rate_limit,
            forwarder,
        }
    }

    pub fn session(&self) -> &SearchSession<B> {
        &self.session
    }
}

impl<B: SearchBackend + 'static> Drop for SessionHandler<B> {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

impl<B: SearchBackend + 'static> CommandHandler for SessionHandler<B> {
    fn input(&self, value: &str) -> Result<()> {
        self.session.input(value);
        Ok(())
    }

    fn key(&self, key: Key) -> Result<Option<ResultItem>> {
        Ok(self.session.key(key))
    }

    fn hover(&self, index: usize) -> Result<()> {
        self.session.hover(index);
        Ok(())
    }

    fn choose(&self, index: usize) -> Result<ResultItem> {
        self.session.choose(index)
    }

    fn focus(&self) -> Result<()> {
        self.session.focus();
        Ok(())
    }

    fn blur(&self) -> Result<()> {
        self.session.blur();
        Ok(())
    }

    fn dismiss_error(&self) -> Result<()> {
        self.session.dismiss_error();
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.session.reset();
        Ok(())
    }

    fn set_credential(&self, token: Option<String>) -> Result<()> {
        self.session.configure_credential(token);
        Ok(())
    }

    fn reset_rate_limit(&self) -> Result<()> {
        self.session.reset_rate_limit();
        Ok(())
    }

    fn clear_cache(&self) -> Result<()> {
        self.session.clear_cache();
        Ok(())
    }

    fn state(&self) -> Result<serde_json::Value> {
        state_payload(&self.session.state())
    }
}

async fn forward_state(
    mut rx: tokio::sync::watch::Receiver<SelectionState>,
    event_tx: broadcast::Sender<EventEnvelope>,
) {
    let mut last_error: Option<String> = None;
    loop {
        let state = rx.borrow_and_update().clone();
        if state.error.is_some() && state.error != last_error {
            if let Some(message) = &state.error {
                emit(&event_tx, events::ERROR, serde_json::json!({"message": message}));
            }
        }
        last_error.clone_from(&state.error);

        match state_payload(&state) {
            Ok(payload) => emit(&event_tx, events::STATE, payload),
            Err(e) => tracing::error!(error = %e, "failed to serialize state; skipping"),
        }

        if rx.changed().await.is_err() {
            break;
        }
    }
    tracing::trace!("state forwarder stopped");
}

fn emit(event_tx: &broadcast::Sender<EventEnvelope>, event: &str, payload: serde_json::Value) {
    // No receivers is fine; the bridge may not be listening yet.
    let _ = event_tx.send(EventEnvelope::fresh(event, payload));
}

fn state_payload(state: &SelectionState) -> Result<serde_json::Value> {
    let mut payload = serde_json::to_value(state)
        .map_err(|e| AppError::Command(format!("failed to serialize state: {e}")))?;
    if let Some(map) = payload.as_object_mut() {
        map.insert("phase".into(), serde_json::json!(state.phase()));
        map.insert(
            "selected".into(),
            serde_json::to_value(state.selected()).unwrap_or_default(),
        );
    }
    Ok(payload)
}

fn navigate_payload(item: &ResultItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id,
        "name": item.name,
        "type": item.kind,
        "url": item.url,
    })
}

fn rate_limit_payload(snapshot: &RateLimitSnapshot, now_secs: i64) -> serde_json::Value {
    let seconds = snapshot.seconds_until_reset(now_secs);
    let mut payload = serde_json::to_value(snapshot).unwrap_or_default();
    if let Some(map) = payload.as_object_mut() {
        map.insert("isExceeded".into(), serde_json::json!(snapshot.is_exceeded()));
        map.insert("secondsUntilReset".into(), serde_json::json!(seconds));
        map.insert("countdown".into(), serde_json::json!(format_countdown(seconds)));
        if snapshot.reset_time_string.is_empty() {
            map.insert(
                "resetTimeString".into(),
                serde_json::json!(format_reset_time(snapshot.reset)),
            );
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use hubcomplete_search::ResultKind;

    #[test]
    fn state_payload_adds_phase() {
        let mut state = SelectionState::new(3);
        state.apply(hubcomplete_search::SelectionEvent::InputChanged("re".into()));
        let payload = state_payload(&state).expect("payload");
        assert_eq!(payload["phase"], "gated");
        assert_eq!(payload["query"], "re");
        assert!(payload["selected"].is_null());
    }

    #[test]
    fn rate_limit_payload_includes_countdown() {
        let snapshot = RateLimitSnapshot {
            limit: 10,
            remaining: 0,
            reset: 1_000_090,
            reset_time_string: "12:00:00".into(),
            is_search_api: true,
            exceeded: true,
        };
        let payload = rate_limit_payload(&snapshot, 1_000_000);
        assert_eq!(payload["secondsUntilReset"], 90);
        assert_eq!(payload["countdown"], "1:30");
        assert_eq!(payload["isExceeded"], true);
        assert_eq!(payload["isSearchAPI"], true);
        assert_eq!(payload["resetTimeString"], "12:00:00");
    }

    #[test]
    fn navigate_payload_carries_url_and_type() {
        let item = ResultItem {
            id: "user-7".into(),
            name: "octocat".into(),
            kind: ResultKind::User,
            url: "https://github.com/octocat".into(),
            avatar_url: String::new(),
            description: None,
        };
        let payload = navigate_payload(&item);
        assert_eq!(payload["url"], "https://github.com/octocat");
        assert_eq!(payload["type"], "user");
    }
}

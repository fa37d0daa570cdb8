//! Persisted, observable rate-limit tracker.
//!
//! Mirrors the provider's request quota locally so the orchestrator can stop
//! calling the API before it starts returning 403s.
//!
//! # State Machine
//!
//! ```text
//!               remaining hits 0, or a
//!               rate-limit error message
//! ┌───────────┐ ─────────────────────────► ┌──────────┐
//! │ Available │                            │ Exceeded │
//! └───────────┘ ◄───────────────────────── └──────────┘
//!               reset tick sees now ≥ reset,
//!               or manual reset / credential change
//! ```
//!
//! Every mutation is written to the store and broadcast to subscribers as a
//! full [`RateLimitSnapshot`]. A new subscriber receives the current snapshot
//! before any later mutation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::SearchConfig;
use crate::storage::KeyValueStore;

/// Store key for the serialised snapshot.
pub const RATE_LIMIT_KEY: &str = "github_rate_limit_info";

/// Store key for the exceeded latch (`"true"` / `"false"`).
pub const RATE_LIMIT_EXCEEDED_KEY: &str = "github_rate_limit_exceeded";

/// How often the background task checks for an elapsed reset time.
const RESET_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Point-in-time view of the quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Epoch seconds at which the window resets, `0` when unknown.
    pub reset: i64,
    /// `reset` rendered as local `HH:MM:SS`, empty when unknown.
    pub reset_time_string: String,
    /// Whether the last observed call hit the (smaller) search quota.
    #[serde(rename = "isSearchAPI")]
    pub is_search_api: bool,
    /// The exceeded latch.
    pub exceeded: bool,
}

impl RateLimitSnapshot {
    /// A fresh window with the full `limit` available.
    pub fn fresh(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
            reset: 0,
            reset_time_string: String::new(),
            is_search_api: true,
            exceeded: false,
        }
    }

    /// Whether requests must be held back.
    pub fn is_exceeded(&self) -> bool {
        self.exceeded || self.remaining == 0
    }

    /// Seconds left until `reset`, zero when unknown or already passed.
    pub fn seconds_until_reset(&self, now_secs: i64) -> u64 {
        if self.reset <= 0 {
            return 0;
        }
        u64::try_from(self.reset.saturating_sub(now_secs)).unwrap_or(0)
    }
}

/// Quota values reported by the provider's response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
}

/// Render a countdown as `m:ss`.
pub fn format_countdown(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Render an epoch-seconds reset time as local `HH:MM:SS`.
pub fn format_reset_time(reset: i64) -> String {
    use chrono::TimeZone;

    if reset <= 0 {
        return String::new();
    }
    match chrono::Local.timestamp_opt(reset, 0) {
        chrono::LocalResult::Single(t) | chrono::LocalResult::Ambiguous(t, _) => {
            t.format("%H:%M:%S").to_string()
        }
        chrono::LocalResult::None => String::new(),
    }
}

type Callback = Arc<dyn Fn(&RateLimitSnapshot) + Send + Sync>;

/// One snapshot addressed to the subscribers registered when it was taken.
struct Delivery {
    snapshot: RateLimitSnapshot,
    callbacks: Vec<Callback>,
}

/// Deliveries waiting to run, in mutation order.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<Delivery>,
    /// Set while some thread is running callbacks.
    draining: bool,
}

/// Observer list shared between the tracker and its [`Subscription`]s.
///
/// Callbacks never run under a lock. Whichever thread finds the outbox idle
/// drains it; others enqueue and return.
#[derive(Default)]
struct SubscriberRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
    outbox: Mutex<Outbox>,
}

/// Clears `Outbox::draining` if a callback panics mid-drain.
struct DrainGuard<'a> {
    outbox: &'a Mutex<Outbox>,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.outbox).draining = false;
        }
    }
}

impl SubscriberRegistry {
    fn add(&self, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.callbacks).push((id, callback));
        id
    }

    fn remove(&self, id: u64) {
        lock(&self.callbacks).retain(|(existing, _)| *existing != id);
    }

    fn current(&self) -> Vec<Callback> {
        lock(&self.callbacks)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }

    fn len(&self) -> usize {
        lock(&self.callbacks).len()
    }

    /// Queue a delivery. Call with the tracker state locked so the queue
    /// order matches mutation order.
    fn enqueue(&self, delivery: Delivery) {
        lock(&self.outbox).pending.push_back(delivery);
    }

    /// Run queued deliveries unless another caller already is.
    ///
    /// A re-entrant call from inside a callback returns at once; the outer
    /// drain picks up whatever it queued.
    fn drain(&self) {
        {
            let mut outbox = lock(&self.outbox);
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        let mut guard = DrainGuard {
            outbox: &self.outbox,
            armed: true,
        };

        loop {
            let next = {
                let mut outbox = lock(&self.outbox);
                match outbox.pending.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        outbox.draining = false;
                        guard.armed = false;
                        return;
                    }
                }
            };
            for callback in &next.callbacks {
                callback(&next.snapshot);
            }
        }
    }
}

/// Handle returned by [`RateLimitTracker::subscribe`].
///
/// Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<SubscriberRegistry>,
    id: u64,
}

impl Subscription {
    /// Stop receiving snapshots.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// What a mutation wants done with the persisted record.
enum Persist {
    Save,
    Purge,
    Keep,
}

/// Quota settings the tracker needs from [`SearchConfig`].
#[derive(Debug, Clone, Copy)]
pub struct QuotaSettings {
    pub anonymous_limit: u32,
    pub authenticated_limit: u32,
    pub window_secs: u64,
}

impl From<&SearchConfig> for QuotaSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            anonymous_limit: config.anonymous_limit,
            authenticated_limit: config.authenticated_limit,
            window_secs: config.quota_window_secs,
        }
    }
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

/// Process-wide quota state machine.
///
/// Construct once with [`RateLimitTracker::load`], share as
/// `Arc<RateLimitTracker>`, and call [`RateLimitTracker::start_reset_check`]
/// from inside a tokio runtime.
///
/// Subscriber callbacks run without any tracker lock held. They may read
/// [`RateLimitTracker::snapshot`] or subscribe further observers. A mutation
/// made from inside a callback is delivered after that callback returns.
pub struct RateLimitTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: QuotaSettings,
    state: Mutex<RateLimitSnapshot>,
    registry: Arc<SubscriberRegistry>,
    ticker: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("snapshot", &*lock(&self.state))
            .field("subscribers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl RateLimitTracker {
    /// Initialise from the store, or from defaults when nothing usable is persisted.
    ///
    /// A record whose reset time has already passed is purged. A set latch
    /// forces `exceeded = true, remaining = 0`. An unparseable record is
    /// treated as absent.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: QuotaSettings,
    ) -> Self {
        let snapshot = load_snapshot(store.as_ref(), clock.as_ref())
            .unwrap_or_else(|| RateLimitSnapshot::fresh(settings.anonymous_limit));

        if snapshot.exceeded {
            tracing::info!(reset = snapshot.reset, "restored exceeded rate-limit latch");
        }

        Self {
            store,
            clock,
            settings,
            state: Mutex::new(snapshot),
            registry: Arc::new(SubscriberRegistry::default()),
            ticker: Mutex::new(None),
        }
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        lock(&self.state).clone()
    }

    /// Whether remote calls must be held back.
    pub fn is_exceeded(&self) -> bool {
        lock(&self.state).is_exceeded()
    }

    /// Register `callback` and replay the current snapshot to it.
    ///
    /// The replay runs before this returns unless another thread is
    /// delivering at the time (or this is called from inside a callback), in
    /// which case it is delivered in order by that drain. Either way the
    /// replay precedes every later mutation.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RateLimitSnapshot) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let state = lock(&self.state);
        let id = self.registry.add(Arc::clone(&callback));
        self.registry.enqueue(Delivery {
            snapshot: state.clone(),
            callbacks: vec![callback],
        });
        drop(state);

        self.registry.drain();

        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Record a completed remote call.
    ///
    /// Reported headers are adopted as-is. Without headers the local
    /// `remaining` is decremented by one, clamped at zero.
    pub fn record_response(&self, quota: Option<QuotaHeaders>, is_search_api: bool) {
        let window = self.window_secs();
        self.mutate(|snapshot, now| {
            snapshot.is_search_api = is_search_api;
            match quota {
                Some(headers) => {
                    snapshot.limit = headers.limit;
                    snapshot.remaining = headers.remaining;
                    snapshot.reset = headers.reset;
                    snapshot.reset_time_string = format_reset_time(headers.reset);
                }
                None => {
                    snapshot.remaining = snapshot.remaining.saturating_sub(1);
                    if snapshot.reset <= 0 {
                        snapshot.reset = now + window;
                        snapshot.reset_time_string = format_reset_time(snapshot.reset);
                    }
                }
            }
            if snapshot.remaining == 0 {
                snapshot.exceeded = true;
            }
            Persist::Save
        });

        let snapshot = self.snapshot();
        tracing::debug!(
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            exceeded = snapshot.exceeded,
            from_headers = quota.is_some(),
            "quota updated"
        );
    }

    /// Latch Exceeded after the provider reported a rate-limit error.
    pub fn record_rate_limit_error(&self) {
        let window = self.window_secs();
        self.mutate(|snapshot, now| {
            snapshot.exceeded = true;
            snapshot.remaining = 0;
            if snapshot.reset <= now {
                snapshot.reset = now + window;
                snapshot.reset_time_string = format_reset_time(snapshot.reset);
            }
            Persist::Save
        });
        tracing::warn!("rate limit reported by provider; holding requests until reset");
    }

    /// Switch between anonymous and authenticated quota.
    ///
    /// Starts a fresh window at the new limit and clears the latch.
    pub fn configure_credential(&self, has_credential: bool) {
        let limit = if has_credential {
            self.settings.authenticated_limit
        } else {
            self.settings.anonymous_limit
        };
        self.mutate(|snapshot, _| {
            *snapshot = RateLimitSnapshot::fresh(limit);
            Persist::Save
        });
        tracing::info!(limit, has_credential, "rate limit reconfigured");
    }

    /// Clear the latch immediately and restore the full quota.
    pub fn reset(&self) {
        self.mutate(|snapshot, _| {
            restore(snapshot);
            Persist::Purge
        });
        tracing::info!("rate limit manually reset");
    }

    /// Restore the quota if the reset time has passed.
    ///
    /// Returns `true` when a reset happened.
    pub fn check_and_reset(&self) -> bool {
        let now = self.clock.now_secs();
        {
            let state = lock(&self.state);
            if state.reset <= 0 || now < state.reset {
                return false;
            }
        }

        let mut reset_happened = false;
        self.mutate(|snapshot, now| {
            // Re-check under the lock; another caller may have won.
            if snapshot.reset > 0 && now >= snapshot.reset {
                restore(snapshot);
                reset_happened = true;
                Persist::Purge
            } else {
                Persist::Keep
            }
        });
        if reset_happened {
            tracing::info!("rate limit window elapsed; quota restored");
        }
        reset_happened
    }

    /// Start the once-per-second reset check. Calling it again while a loop
    /// is running does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_reset_check(self: &Arc<Self>) {
        let mut ticker = lock(&self.ticker);
        if ticker.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return;
        }

        let cancel = CancellationToken::new();
        *ticker = Some(cancel.clone());
        drop(ticker);

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RESET_CHECK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(tracker) = weak.upgrade() else { break };
                        tracker.check_and_reset();
                    }
                }
            }
            tracing::debug!("rate-limit reset check stopped");
        });
    }

    /// Stop the reset check loop, if one is running.
    pub fn stop_reset_check(&self) {
        if let Some(cancel) = lock(&self.ticker).take() {
            cancel.cancel();
        }
    }

    /// Whether a reset check loop is active.
    pub fn reset_check_running(&self) -> bool {
        lock(&self.ticker)
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.settings.window_secs).unwrap_or(i64::MAX)
    }

    /// Apply `f`, persist, and broadcast the result.
    ///
    /// The delivery is queued with the subscriber list captured before the
    /// state lock is released, so notifications go out in mutation order and
    /// a subscriber added afterwards is never told about this mutation.
    fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut RateLimitSnapshot, i64) -> Persist,
    {
        let mut state = lock(&self.state);
        let now = self.clock.now_secs();
        match f(&mut state, now) {
            Persist::Save => self.save(&state),
            Persist::Purge => self.purge(),
            Persist::Keep => {}
        }
        self.registry.enqueue(Delivery {
            snapshot: state.clone(),
            callbacks: self.registry.current(),
        });
        drop(state);

        self.registry.drain();
    }

    fn save(&self, snapshot: &RateLimitSnapshot) {
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode rate-limit snapshot");
                return;
            }
        };
        let latch = if snapshot.exceeded { "true" } else { "false" };
        if let Err(e) = self
            .store
            .set(RATE_LIMIT_KEY, &json)
            .and_then(|()| self.store.set(RATE_LIMIT_EXCEEDED_KEY, latch))
        {
            tracing::warn!(error = %e, "cannot persist rate-limit snapshot");
        }
    }

    fn purge(&self) {
        purge_record(self.store.as_ref());
    }
}

impl Drop for RateLimitTracker {
    fn drop(&mut self) {
        self.stop_reset_check();
    }
}

fn purge_record(store: &dyn KeyValueStore) {
    for key in [RATE_LIMIT_KEY, RATE_LIMIT_EXCEEDED_KEY] {
        if let Err(e) = store.remove(key) {
            tracing::warn!(error = %e, key, "cannot remove rate-limit record");
        }
    }
}

fn restore(snapshot: &mut RateLimitSnapshot) {
    snapshot.exceeded = false;
    snapshot.remaining = snapshot.limit;
    snapshot.reset = 0;
    snapshot.reset_time_string.clear();
}

fn load_snapshot(store: &dyn KeyValueStore, clock: &dyn Clock) -> Option<RateLimitSnapshot> {
    let raw = match store.get(RATE_LIMIT_KEY) {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read rate-limit snapshot");
            return None;
        }
    };

    let mut snapshot: RateLimitSnapshot = match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable rate-limit snapshot");
            return None;
        }
    };

    if snapshot.reset > 0 && clock.now_secs() >= snapshot.reset {
        purge_record(store);
        return None;
    }

    let latched = matches!(store.get(RATE_LIMIT_EXCEEDED_KEY), Ok(Some(ref v)) if v == "true");
    if latched && !snapshot.exceeded {
        snapshot.exceeded = true;
        snapshot.remaining = 0;
    }
    Some(snapshot)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

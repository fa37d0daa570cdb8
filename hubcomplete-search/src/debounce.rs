//! Typing-aware debouncing of the live input value.
//!
//! A changed value is committed at the earlier of two deadlines:
//!
//! - `delay` after the first change since the last commit, so continuous
//!   typing still commits at least once per `delay`
//! - `quiet` after the most recent change, so a short burst followed by a
//!   pause commits exactly once
//!
//! [`DebounceState`] holds the timing rules and is driven by an explicit
//! clock. [`TypingAwareDebouncer`] runs it on a tokio task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;

/// Debounce timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    /// Longest a changed value waits before being committed.
    pub delay: Duration,
    /// Silence that commits early.
    pub quiet: Duration,
}

impl From<&SearchConfig> for DebounceSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.debounce_ms),
            quiet: Duration::from_millis(config.typing_threshold_ms),
        }
    }
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

/// Pending value and deadlines, with no timers of its own.
#[derive(Debug)]
pub struct DebounceState<T> {
    settings: DebounceSettings,
    pending: Option<T>,
    max_deadline: Option<Instant>,
    quiet_deadline: Option<Instant>,
}

impl<T> DebounceState<T> {
    pub fn new(settings: DebounceSettings) -> Self {
        Self {
            settings,
            pending: None,
            max_deadline: None,
            quiet_deadline: None,
        }
    }

    /// Record a new value observed at `now`.
    pub fn change(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.max_deadline.get_or_insert(now + self.settings.delay);
        self.quiet_deadline = Some(now + self.settings.quiet);
    }

    /// When the pending value should be committed, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        match (self.max_deadline, self.quiet_deadline) {
            (Some(max), Some(quiet)) => Some(max.min(quiet)),
            (a, b) => a.or(b),
        }
    }

    /// Take the pending value if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.deadline().is_some_and(|d| d <= now) {
            self.max_deadline = None;
            self.quiet_deadline = None;
            self.pending.take()
        } else {
            None
        }
    }

    /// Drop the pending value and both deadlines.
    pub fn clear(&mut self) {
        self.pending = None;
        self.max_deadline = None;
        self.quiet_deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

enum Input {
    Value(String),
    Reset,
}

/// Handle to a running debounce task.
///
/// Committed values arrive on the receiver returned by
/// [`TypingAwareDebouncer::spawn`]. Dropping the handle stops the task.
#[derive(Debug)]
pub struct TypingAwareDebouncer {
    input: mpsc::UnboundedSender<Input>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value"),
            Self::Reset => f.write_str("Reset"),
        }
    }
}

impl TypingAwareDebouncer {
    /// Start the debounce task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(settings: DebounceSettings) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run(settings, input_rx, commit_tx, cancel.clone()));

        (
            Self {
                input: input_tx,
                cancel,
            },
            commit_rx,
        )
    }

    /// Feed the latest input value.
    pub fn push(&self, value: impl Into<String>) {
        let _ = self.input.send(Input::Value(value.into()));
    }

    /// Cancel any pending commit.
    pub fn reset(&self) {
        let _ = self.input.send(Input::Reset);
    }

    /// Stop the task. Pending values are discarded.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.input.is_closed()
    }
}

impl Drop for TypingAwareDebouncer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    settings: DebounceSettings,
    mut input: mpsc::UnboundedReceiver<Input>,
    commits: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) {
    let mut state = DebounceState::new(settings);
    loop {
        let deadline = state.deadline();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = input.recv() => match msg {
                Some(Input::Value(value)) => state.change(value, Instant::now()),
                Some(Input::Reset) => state.clear(),
                None => break,
            },
            _ = sleep_until(deadline) => {
                if let Some(value) = state.poll(Instant::now()) {
                    tracing::trace!(len = value.len(), "debounced value committed");
                    if commits.send(value).is_err() {
                        break;
                    }
                }
            }
        }
    }
    tracing::trace!("debounce task stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

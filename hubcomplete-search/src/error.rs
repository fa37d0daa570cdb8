//! Error types for the hubcomplete-search crate.
//!
//! Remote and search failures are classified here and turned into a single
//! user-facing string at the orchestrator boundary via
//! [`SearchError::user_message`]. Cache and storage failures are represented
//! too, but never travel past the component that observed them.

/// Message shown when the rate-limit latch is active.
pub const RATE_LIMIT_MESSAGE: &str = "GitHub API rate limit exceeded. Please try again later.";

/// Message shown when the transport failed before a response arrived.
pub const NETWORK_MESSAGE: &str = "Network error. Please check your connection and try again.";

/// Errors that can occur during a search.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// The rate-limit latch is active and no fallback result was available.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-2xx status.
    #[error("remote error ({status}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Provider message, or a generic description if the body had none.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// A cache entry could not be decoded. Treated as a miss.
    #[error("cache entry corrupt: {0}")]
    CacheCorrupt(String),

    /// The persistence layer failed. Callers degrade silently.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The committed query is shorter than the configured minimum.
    #[error("query must be at least {min_chars} characters")]
    QueryTooShort {
        /// Configured minimum length.
        min_chars: usize,
    },
}

impl SearchError {
    /// Whether this failure means the provider's quota is exhausted.
    ///
    /// True for [`SearchError::RateLimitExceeded`] and for any error whose
    /// message uses rate-limit phrasing.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimitExceeded => true,
            Self::Remote { message, .. } | Self::Network(message) => is_rate_limit_message(message),
            _ => false,
        }
    }

    /// The single string surfaced to the user for this failure.
    pub fn user_message(&self) -> String {
        if self.is_rate_limit() {
            return RATE_LIMIT_MESSAGE.to_owned();
        }
        match self {
            Self::Network(_) => NETWORK_MESSAGE.to_owned(),
            Self::Remote { message, .. } => format!("Error: {message}"),
            other => format!("Error: {other}"),
        }
    }
}

/// Returns `true` when `message` reads like a provider rate-limit message.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("api rate") || lower.contains("api limit")
}

/// Convenience type alias for hubcomplete-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

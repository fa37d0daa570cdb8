//! Versioned host command/event envelopes for the search box bridge.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands a host UI may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Ping,
    /// Raw input value changed; `payload.value`.
    Input,
    /// Navigation key pressed; `payload.key`.
    Key,
    /// Pointer over a result; `payload.index`.
    Hover,
    /// Pointer click on a result; `payload.index`.
    Choose,
    Focus,
    Blur,
    DismissError,
    Reset,
    /// Set or clear the bearer token; `payload.token` (string or null).
    Credential,
    ResetRateLimit,
    ClearCache,
    /// Query the current view state.
    State,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Input => "input",
            Self::Key => "key",
            Self::Hover => "hover",
            Self::Choose => "choose",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::DismissError => "dismiss_error",
            Self::Reset => "reset",
            Self::Credential => "credential",
            Self::ResetRateLimit => "reset_rate_limit",
            Self::ClearCache => "clear_cache",
            Self::State => "state",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ping" => Some(Self::Ping),
            "input" => Some(Self::Input),
            "key" => Some(Self::Key),
            "hover" => Some(Self::Hover),
            "choose" => Some(Self::Choose),
            "focus" => Some(Self::Focus),
            "blur" => Some(Self::Blur),
            "dismiss_error" => Some(Self::DismissError),
            "reset" => Some(Self::Reset),
            "credential" => Some(Self::Credential),
            "reset_rate_limit" => Some(Self::ResetRateLimit),
            "clear_cache" => Some(Self::ClearCache),
            "state" => Some(Self::State),
            _ => None,
        }
    }
}

/// Events pushed to the host UI.
pub mod events {
    /// Full [`hubcomplete_search::SelectionState`] after every change.
    pub const STATE: &str = "state";
    /// Rate-limit snapshot, replayed once on startup.
    pub const RATE_LIMIT: &str = "rate_limit";
    /// A result was committed with Enter or a click.
    pub const NAVIGATE: &str = "navigate";
    /// A search failed with a user-facing message.
    pub const ERROR: &str = "error";
}

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractError`] for a version mismatch or a blank `request_id`.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }

    /// Build an event with a fresh random id.
    #[must_use]
    pub fn fresh(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event, payload)
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

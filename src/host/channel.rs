//! Host command channel and router.
//!
//! [`HostCommandClient`] sends validated [`CommandEnvelope`]s to a
//! [`HostCommandServer`], which decodes the payload and calls the matching
//! [`CommandHandler`] method. Events flow back on a shared broadcast channel.

use hubcomplete_search::ResultItem;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{AppError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::session::Key;

/// Side of the channel that owns the search session.
pub trait CommandHandler: Send + Sync + 'static {
    fn input(&self, value: &str) -> Result<()>;
    fn key(&self, key: Key) -> Result<Option<ResultItem>>;
    fn hover(&self, index: usize) -> Result<()>;
    fn choose(&self, index: usize) -> Result<ResultItem>;
    fn focus(&self) -> Result<()>;
    fn blur(&self) -> Result<()>;
    fn dismiss_error(&self) -> Result<()>;
    fn reset(&self) -> Result<()>;
    fn set_credential(&self, token: Option<String>) -> Result<()>;
    fn reset_rate_limit(&self) -> Result<()>;
    fn clear_cache(&self) -> Result<()>;
    /// Current view state as JSON.
    fn state(&self) -> Result<serde_json::Value>;
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    /// Dispatch `envelope` and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] for an invalid envelope and
    /// [`AppError::Channel`] if the server has gone away.
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            AppError::Command(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| AppError::Channel(format!("failed to send host command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| AppError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<H: CommandHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    handler: H,
}

/// Create a command channel around `handler`, sharing `event_tx` with it.
#[must_use]
pub fn command_channel<H: CommandHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    (
        HostCommandClient {
            request_tx,
            event_tx,
        },
        HostCommandServer {
            request_rx,
            handler,
        },
    )
}

impl<H: CommandHandler> HostCommandServer<H> {
    /// Serve requests until every client is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let envelope = &request.envelope;
            let response = self.route(envelope).unwrap_or_else(|e| {
                tracing::debug!(
                    command = envelope.command.as_str(),
                    error = %e,
                    "host command rejected"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            });
            let _ = request.response_tx.send(response);
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Route a command envelope to the handler.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] for a malformed payload, or whatever
    /// the handler returns.
    pub fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let payload = &envelope.payload;
        let body = match envelope.command {
            CommandName::Ping => serde_json::json!({
                "pong": true,
                "contract_version": crate::host::contract::EVENT_VERSION,
            }),
            CommandName::Input => {
                let value = parse_string_field(payload, "value", "input")?;
                self.handler.input(&value)?;
                accepted()
            }
            CommandName::Key => {
                let raw = parse_string_field(payload, "key", "key")?;
                let key = Key::parse(&raw).ok_or_else(|| {
                    AppError::Command(format!(
                        "unsupported key `{raw}` (expected ArrowDown/ArrowUp/Enter/Escape)"
                    ))
                })?;
                let selected = self.handler.key(key)?;
                serde_json::json!({"accepted": true, "key": key.as_str(), "selected": selected})
            }
            CommandName::Hover => {
                self.handler.hover(parse_index(payload, "hover")?)?;
                accepted()
            }
            CommandName::Choose => {
                let selected = self.handler.choose(parse_index(payload, "choose")?)?;
                serde_json::json!({"accepted": true, "selected": selected})
            }
            CommandName::Focus => {
                self.handler.focus()?;
                accepted()
            }
            CommandName::Blur => {
                self.handler.blur()?;
                accepted()
            }
            CommandName::DismissError => {
                self.handler.dismiss_error()?;
                accepted()
            }
            CommandName::Reset => {
                self.handler.reset()?;
                accepted()
            }
            CommandName::Credential => {
                let token = parse_optional_token(payload)?;
                let authenticated = token.is_some();
                self.handler.set_credential(token)?;
                serde_json::json!({"accepted": true, "authenticated": authenticated})
            }
            CommandName::ResetRateLimit => {
                self.handler.reset_rate_limit()?;
                accepted()
            }
            CommandName::ClearCache => {
                self.handler.clear_cache()?;
                accepted()
            }
            CommandName::State => self.handler.state()?,
        };
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), body))
    }
}

fn accepted() -> serde_json::Value {
    serde_json::json!({"accepted": true})
}

fn parse_string_field(payload: &serde_json::Value, field: &str, command: &str) -> Result<String> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AppError::Command(format!("{command} requires payload.{field}")))
}

fn parse_index(payload: &serde_json::Value, command: &str) -> Result<usize> {
    let Some(raw) = payload.get("index").and_then(serde_json::Value::as_u64) else {
        return Err(AppError::Command(format!(
            "{command} requires payload.index (non-negative integer)"
        )));
    };
    usize::try_from(raw).map_err(|_| AppError::Command(format!("{command} index out of range")))
}

fn parse_optional_token(payload: &serde_json::Value) -> Result<Option<String>> {
    match payload.get("token") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(raw)) => {
            let token = raw.trim();
            Ok((!token.is_empty()).then(|| token.to_owned()))
        }
        Some(_) => Err(AppError::Command(
            "credential payload.token must be a string or null".to_owned(),
        )),
    }
}

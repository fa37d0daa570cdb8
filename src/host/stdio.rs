//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them to a [`SessionHandler`], and writes `ResponseEnvelope`
//! and `EventEnvelope` messages as newline-delimited JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use std::sync::Arc;

use hubcomplete_search::{SearchBackend, SearchOrchestrator};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

use crate::error::{AppError, Result};
use crate::host::channel::{HostCommandClient, command_channel};
use crate::host::contract::{CommandEnvelope, ResponseEnvelope};
use crate::host::handler::SessionHandler;

/// Default request channel capacity for the stdio bridge.
const REQUEST_CAPACITY: usize = 64;

/// Default event broadcast channel capacity for the stdio bridge.
const EVENT_CAPACITY: usize = 256;

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge on the process's stdin and stdout until stdin closes.
///
/// # Errors
///
/// Returns [`AppError::Channel`] if stdin cannot be read or stdout cannot
/// be written.
pub async fn run_stdio_bridge<B: SearchBackend + 'static>(
    orchestrator: Arc<SearchOrchestrator<B>>,
) -> Result<()> {
    run_bridge(
        orchestrator,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge over arbitrary line input and output until `input` ends.
///
/// Three concurrent tasks operate in parallel:
///
/// 1. **Reader** -- reads newline-delimited JSON, dispatches each
///    `CommandEnvelope` through the host command client, and writes the
///    resulting `ResponseEnvelope`.
/// 2. **Event forwarder** -- receives broadcast `EventEnvelope` messages and
///    writes them as JSON lines.
/// 3. **Server** -- runs the `HostCommandServer` router loop.
///
/// # Errors
///
/// See [`run_stdio_bridge`].
pub async fn run_bridge<B, R, W>(
    orchestrator: Arc<SearchOrchestrator<B>>,
    input: R,
    output: W,
) -> Result<()>
where
    B: SearchBackend + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, mut event_rx) = broadcast::channel(EVENT_CAPACITY);
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(output)));

    // Subscribed before the handler starts so the initial events are kept.
    let handler = SessionHandler::spawn(orchestrator, event_tx.clone());
    let (client, server) = command_channel(REQUEST_CAPACITY, event_tx, handler);

    let server_handle = tokio::spawn(server.run());

    let event_writer = Arc::clone(&writer);
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(client, input, Arc::clone(&writer)).await;

    // The client was dropped by `run_reader`; the server drains and exits,
    // dropping the session with it.
    let _ = server_handle.await;
    event_handle.abort();
    let _ = event_handle.await;

    let mut w = writer.lock().await;
    let _ = w.flush().await;

    reader_result
}

/// Read line-by-line, dispatch each command, and write responses.
async fn run_reader<R, W>(
    client: HostCommandClient,
    mut reader: R,
    writer: SharedWriter<W>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| AppError::Channel(format!("failed to read from stdin: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down stdio bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => match client.send(envelope).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "host command dispatch failed");
                    ResponseEnvelope::error("dispatch-error", format!("dispatch failed: {e}"))
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse command envelope from stdin");
                ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                )
            }
        };

        let json = serde_json::to_string(&response)
            .map_err(|e| AppError::Channel(format!("failed to serialize response envelope: {e}")))?;
        let mut w = writer.lock().await;
        write_line(&mut w, &json).await?;
    }

    Ok(())
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| AppError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| AppError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| AppError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}

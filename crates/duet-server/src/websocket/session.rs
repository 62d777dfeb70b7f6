//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use duet_core::{AdmissionError, ClientId, MAX_SESSIONS, ServerEvent};

use super::connection::ClientConnection;
use super::handler::{Inbound, classify};
use crate::config::ServerConfig;
use crate::errors::RegistryError;
use crate::metrics::{
    INVALID_MESSAGES_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::RegistryHandle;

/// How long to wait for the peer to acknowledge a Close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-connection tunables.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Outbound queue depth.
    pub send_queue_capacity: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is considered dead.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerConfig> for SessionConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity.max(1),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

/// Run a WebSocket session for a freshly upgraded client.
///
/// 1. Asks the registry to admit the connection; a refused client gets a
///    `rejected` event and a Close frame
/// 2. Forwards decoded events to the registry, answering undecodable frames
///    with an `error` event
/// 3. Drains the outbound queue and sends periodic Pings on a writer task
/// 4. Removes the session once the client leaves, times out, or the server
///    shuts down
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    mut ws: WebSocket,
    client_id: ClientId,
    registry: RegistryHandle,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    match registry.connect(connection.clone()).await {
        Ok(session) => {
            info!(connected_at = %session.connected_at, "client connected");
            counter!(WS_CONNECTIONS_TOTAL).increment(1);
        }
        Err(RegistryError::Rejected(err)) => {
            info!(reason = err.kind(), "client rejected");
            reject(&mut ws, &err).await;
            return;
        }
        Err(RegistryError::Closed) => {
            warn!("registry unavailable, closing connection");
            close_and_drain(&mut ws, close_code::ERROR, "server unavailable").await;
            return;
        }
    }

    let (ws_tx, mut ws_rx) = ws.split();
    let stop = shutdown.child_token();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        connection.clone(),
        config.clone(),
        stop.clone(),
        shutdown.clone(),
    ));
    let mut writer_finished = false;

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(Ok(message)) = frame else {
                    debug!("stream ended");
                    break;
                };
                connection.mark_alive();
                match classify(&message) {
                    Inbound::Event(event) => {
                        debug!(event = event.name(), "event received");
                        if registry.dispatch(client_id.clone(), event).await.is_err() {
                            warn!("registry stopped, dropping client");
                            break;
                        }
                    }
                    Inbound::Invalid(err) => {
                        warn!(error = %err, "invalid message");
                        counter!(INVALID_MESSAGES_TOTAL).increment(1);
                        let _ = connection.send_event(&ServerEvent::invalid_message(&err));
                    }
                    Inbound::Heartbeat => {}
                    Inbound::Close => {
                        info!("client sent close frame");
                        break;
                    }
                }
            }
            _ = &mut writer => {
                writer_finished = true;
                break;
            }
            () = shutdown.cancelled() => break,
        }
    }

    match registry.disconnect(client_id).await {
        Ok(Some(session)) => debug!(last_value = %session.value, "session removed"),
        Ok(None) => debug!("session already gone"),
        Err(e) => warn!(error = %e, "could not remove session"),
    }

    stop.cancel();
    if !writer_finished && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(
        dropped_messages = connection.drop_count(),
        duration_secs = connection.age().as_secs_f64(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

/// Forward queued frames to the socket and keep the client honest with Pings.
///
/// Ends when the socket fails, the client misses its pong deadline, or
/// `stop` fires. Always tries to send a Close frame on the way out.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    config: SessionConfig,
    stop: CancellationToken,
    shutdown: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(config.heartbeat_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;
    let started = Instant::now();

    let close = loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                break if shutdown.is_cancelled() {
                    close_frame(close_code::AWAY, "server shutting down")
                } else {
                    close_frame(close_code::NORMAL, "")
                };
            }
            queued = send_rx.recv() => {
                let Some(text) = queued else {
                    break close_frame(close_code::NORMAL, "");
                };
                if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                    return;
                }
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > config.heartbeat_timeout {
                    warn!(
                        timeout_secs = config.heartbeat_timeout.as_secs(),
                        connected_secs = started.elapsed().as_secs(),
                        "client unresponsive, disconnecting"
                    );
                    break close_frame(close_code::AWAY, "heartbeat timeout");
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    };

    let _ = ws_tx.send(close).await;
    let _ = ws_tx.close().await;
}

/// Tell a refused client why, then close.
async fn reject(ws: &mut WebSocket, err: &AdmissionError) {
    let (event, code, reason) = rejection(err);
    match event.to_json() {
        Ok(json) => {
            let _ = ws.send(Message::Text(json.into())).await;
        }
        Err(e) => warn!(error = %e, "failed to encode rejection"),
    }
    close_and_drain(ws, code, reason).await;
}

/// The event, close code and close reason sent to a refused client.
fn rejection(err: &AdmissionError) -> (ServerEvent, u16, &'static str) {
    match err {
        AdmissionError::AtCapacity { limit } => (
            ServerEvent::Rejected {
                reason: err.to_string(),
                max_sessions: *limit,
            },
            close_code::AGAIN,
            "server full",
        ),
        AdmissionError::Duplicate(_) => (
            ServerEvent::Rejected {
                reason: err.to_string(),
                max_sessions: MAX_SESSIONS,
            },
            close_code::POLICY,
            "duplicate client",
        ),
    }
}

fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}

/// Send a Close frame and wait briefly for the peer's reply.
async fn close_and_drain(ws: &mut WebSocket, code: u16, reason: &'static str) {
    if ws.send(close_frame(code, reason)).await.is_err() {
        return;
    }
    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = ws.recv().await {}
    })
    .await;
}

//! Inbound frame classification.
//!
//! Text and binary frames are decoded as [`ClientEvent`]s; control frames
//! are mapped to liveness or close signals.

use axum::extract::ws::Message;
use duet_core::{ClientEvent, ProtocolError};
use tracing::debug;

/// What the session loop should do with one inbound frame.
#[derive(Debug)]
pub enum Inbound {
    /// A decoded event to forward to the registry.
    Event(ClientEvent),
    /// The frame could not be decoded.
    Invalid(ProtocolError),
    /// Ping or Pong: proof of life, nothing to dispatch.
    Heartbeat,
    /// The peer asked to close.
    Close,
}

/// Classify an inbound WebSocket frame.
pub fn classify(message: &Message) -> Inbound {
    let decoded = match message {
        Message::Text(text) => ClientEvent::from_json(text.as_str()),
        Message::Binary(bytes) => ClientEvent::from_bytes(bytes),
        Message::Ping(_) | Message::Pong(_) => return Inbound::Heartbeat,
        Message::Close(frame) => {
            debug!(code = frame.as_ref().map(|f| f.code), "close frame received");
            return Inbound::Close;
        }
    };
    match decoded {
        Ok(event) => Inbound::Event(event),
        Err(e) => Inbound::Invalid(e),
    }
}

//! Session registry: admission control, value storage and fan-out.
//!
//! The registry is plain synchronous state. It is only ever touched by the
//! actor in [`super::actor`], one command at a time, so it needs no locks.

use std::collections::HashMap;
use std::sync::Arc;

use duet_core::{AdmissionError, ClientEvent, ClientId, MAX_SESSIONS, ServerEvent, Session};
use serde_json::Number;
use tracing::{debug, info, warn};

use crate::websocket::connection::ClientConnection;

struct Entry {
    session: Session,
    connection: Arc<ClientConnection>,
}

/// What handling one client event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The sender got its identifier back.
    Replied {
        /// Whether the reply was queued.
        delivered: bool,
    },
    /// A value update was stored and relayed.
    Relayed {
        /// Sessions other than the sender.
        recipients: usize,
        /// Recipients whose queue accepted the frame.
        delivered: usize,
    },
    /// The sender has no session (not admitted or already removed).
    UnknownSender,
}

/// Mapping from client identifier to session, capped at [`MAX_SESSIONS`].
pub struct Registry {
    entries: HashMap<ClientId, Entry>,
    capacity: usize,
}

impl Registry {
    /// Create an empty registry with the standard cap.
    pub fn new() -> Self {
        Self {
            entries: HashMap::with_capacity(MAX_SESSIONS),
            capacity: MAX_SESSIONS,
        }
    }

    /// Admit a new connection with a fresh session (value `0`).
    pub fn admit(&mut self, connection: Arc<ClientConnection>) -> Result<&Session, AdmissionError> {
        let id = connection.id.clone();
        if self.contains(&id) {
            return Err(AdmissionError::Duplicate(id));
        }
        if self.entries.len() >= self.capacity {
            return Err(AdmissionError::AtCapacity {
                limit: self.capacity,
            });
        }

        let entry = self.entries.entry(id.clone()).or_insert(Entry {
            session: Session::new(id),
            connection,
        });
        info!(client_id = %entry.session.id, "session admitted");
        Ok(&entry.session)
    }

    /// Remove a session. Returns it if it existed.
    pub fn remove(&mut self, id: &ClientId) -> Option<Session> {
        let removed = self.entries.remove(id).map(|e| e.session);
        if removed.is_some() {
            info!(client_id = %id, sessions = self.entries.len(), "session removed");
        }
        removed
    }

    /// Apply one event from `sender`.
    pub fn handle_event(&mut self, sender: &ClientId, event: ClientEvent) -> Dispatch {
        match event {
            ClientEvent::GetClientId => self.reply_client_id(sender),
            ClientEvent::SetValue { client_id, value } => self.set_value(sender, &client_id, value),
        }
    }

    fn reply_client_id(&self, sender: &ClientId) -> Dispatch {
        let Some(entry) = self.entries.get(sender) else {
            return Dispatch::UnknownSender;
        };
        let delivered = entry.connection.send_event(&ServerEvent::ClientId {
            client_id: sender.clone(),
        });
        Dispatch::Replied { delivered }
    }

    /// Store `value` on the sender's own session and relay it to every
    /// other session. The identifier in the payload is informational only.
    fn set_value(&mut self, sender: &ClientId, claimed: &ClientId, value: Number) -> Dispatch {
        let Some(entry) = self.entries.get_mut(sender) else {
            return Dispatch::UnknownSender;
        };
        if claimed != sender {
            warn!(client_id = %sender, claimed = %claimed, "setValue names another client; updating sender");
        }
        let previous = entry.session.set_value(value.clone());
        debug!(client_id = %sender, %previous, %value, "value updated");

        let frame = match (ServerEvent::SetOther { value }).to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to encode setOther");
                return Dispatch::Relayed {
                    recipients: self.entries.len() - 1,
                    delivered: 0,
                };
            }
        };

        let mut recipients = 0;
        let mut delivered = 0;
        for (id, other) in &self.entries {
            if id == sender {
                continue;
            }
            recipients += 1;
            if other.connection.send(frame.clone()) {
                delivered += 1;
            } else {
                warn!(client_id = %id, "failed to relay value (queue full or closed)");
            }
        }
        Dispatch::Relayed {
            recipients,
            delivered,
        }
    }

    /// Number of active sessions.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Session cap.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `id` has a live session.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.entries.contains_key(id)
    }

    /// Copies of all sessions, oldest first.
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.entries.values().map(|e| e.session.clone()).collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

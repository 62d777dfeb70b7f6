//! Per-connection session state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Number;

use crate::ids::ClientId;

/// Maximum number of sessions the registry admits at once.
pub const MAX_SESSIONS: usize = 2;

/// State the registry keeps for one admitted connection.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Identifier of the owning connection.
    pub id: ClientId,
    /// Last value reported by this client, as received.
    pub value: Number,
    /// When the session was admitted.
    pub connected_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with the initial value `0`.
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            value: Number::from(0),
            connected_at: Utc::now(),
        }
    }

    /// Overwrite the stored value, returning the previous one.
    pub fn set_value(&mut self, value: Number) -> Number {
        std::mem::replace(&mut self.value, value)
    }
}

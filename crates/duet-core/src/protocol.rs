//! Wire protocol for the real-time channel.
//!
//! Every WebSocket frame carries one JSON object of the form
//! `{ "event": <name>, "data": <payload> }`. Events without a payload omit
//! `data` on the way out; on the way in a missing, `null` or empty `data`
//! is accepted. Values are JSON numbers relayed exactly as received, so an
//! integer `42` comes back as `42` and never as `42.0`.
//!
//! | Direction | Event         | Data                              |
//! |-----------|---------------|-----------------------------------|
//! | C → S     | `getClientID` | none, `null` or `{}`              |
//! | C → S     | `setValue`    | `{ clientID, value }`             |
//! | S → C     | `clientID`    | `{ clientID }`                    |
//! | S → C     | `setOther`    | `{ value }`                       |
//! | S → C     | `rejected`    | `{ reason, maxSessions }`         |
//! | S → C     | `error`       | `{ code, message }`               |

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::errors::ProtocolError;
use crate::ids::ClientId;

/// Error code sent when an inbound frame cannot be decoded.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

const CLIENT_EVENTS: &[&str] = &["getClientID", "setValue"];

/// Events a client sends to the server.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Ask for the connection's own identifier.
    #[serde(rename = "getClientID")]
    GetClientId,
    /// Report a new value; relayed to every other client.
    #[serde(rename = "setValue")]
    SetValue {
        /// Identifier the client claims as its own.
        #[serde(rename = "clientID")]
        client_id: ClientId,
        /// The new value.
        value: Number,
    },
}

/// Inbound frame before the event name is resolved.
#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct SetValueData {
    #[serde(rename = "clientID")]
    client_id: ClientId,
    value: Number,
}

impl<'de> Deserialize<'de> for ClientEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Envelope { event, data } = Envelope::deserialize(deserializer)?;
        match event.as_str() {
            "getClientID" => match data {
                None => Ok(Self::GetClientId),
                Some(Value::Object(map)) if map.is_empty() => Ok(Self::GetClientId),
                Some(_) => Err(de::Error::custom("getClientID takes no data")),
            },
            "setValue" => {
                let data = data.ok_or_else(|| <D::Error as de::Error>::missing_field("data"))?;
                let SetValueData { client_id, value } =
                    SetValueData::deserialize(data).map_err(<D::Error as de::Error>::custom)?;
                Ok(Self::SetValue { client_id, value })
            }
            other => Err(de::Error::unknown_variant(other, CLIENT_EVENTS)),
        }
    }
}

impl ClientEvent {
    /// Wire name of the event, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetClientId => "getClientID",
            Self::SetValue { .. } => "setValue",
        }
    }

    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Decode a binary frame holding UTF-8 JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NonUtf8 {
            len: bytes.len(),
        })?;
        Self::from_json(text)
    }
}

/// Events the server sends to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Reply to `getClientID`.
    #[serde(rename = "clientID")]
    ClientId {
        /// The requesting connection's identifier.
        #[serde(rename = "clientID")]
        client_id: ClientId,
    },
    /// Another client updated its value.
    #[serde(rename = "setOther")]
    SetOther {
        /// The other client's new value.
        value: Number,
    },
    /// The connection was not admitted. Sent once, right before closing.
    #[serde(rename = "rejected")]
    Rejected {
        /// Human-readable reason.
        reason: String,
        /// Session cap in effect.
        #[serde(rename = "maxSessions")]
        max_sessions: usize,
    },
    /// An inbound frame could not be handled.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

impl ServerEvent {
    /// Build an `error` event for an undecodable frame.
    pub fn invalid_message(err: &ProtocolError) -> Self {
        Self::Error {
            code: INVALID_MESSAGE.into(),
            message: err.to_string(),
        }
    }

    /// Wire name of the event, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientId { .. } => "clientID",
            Self::SetOther { .. } => "setOther",
            Self::Rejected { .. } => "rejected",
            Self::Error { .. } => "error",
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

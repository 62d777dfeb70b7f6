//! Error types shared across duet crates.
//!
//! - [`AdmissionError`]: why the registry refused a new connection
//! - [`ProtocolError`]: why a frame could not be decoded or encoded

use thiserror::Error;

use crate::ids::ClientId;

/// Reasons a connection is not admitted to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The registry already holds the maximum number of sessions.
    #[error("server full: at most {limit} concurrent sessions")]
    AtCapacity {
        /// Session cap in effect.
        limit: usize,
    },
    /// A session with this identifier already exists.
    #[error("client {0} is already connected")]
    Duplicate(ClientId),
}

impl AdmissionError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AtCapacity { .. } => "at_capacity",
            Self::Duplicate(_) => "duplicate",
        }
    }
}

/// Failures decoding or encoding protocol frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a valid event object.
    #[error("invalid message: {0}")]
    Malformed(#[source] serde_json::Error),
    /// A binary frame did not hold UTF-8 text.
    #[error("binary frame of {len} bytes is not valid UTF-8")]
    NonUtf8 {
        /// Frame length in bytes.
        len: usize,
    },
    /// An outbound event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

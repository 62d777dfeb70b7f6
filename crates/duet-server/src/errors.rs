//! Server error types.

use duet_core::AdmissionError;
use thiserror::Error;

/// Failures talking to the registry actor.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The actor has stopped; no further commands are accepted.
    #[error("session registry is not running")]
    Closed,
    /// The connection was not admitted.
    #[error("connection rejected: {0}")]
    Rejected(#[from] AdmissionError),
}

/// Failures starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other I/O failure on the listener.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_includes_reason() {
        let err = RegistryError::from(AdmissionError::AtCapacity { limit: 2 });
        assert_eq!(
            err.to_string(),
            "connection rejected: server full: at most 2 concurrent sessions"
        );
    }

    #[test]
    fn bind_display_includes_addr() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:3000".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("0.0.0.0:3000"));
    }
}

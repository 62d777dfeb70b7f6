//! # duet-core
//!
//! Foundation types shared by the duet server crates:
//!
//! - **Branded IDs**: [`ClientId`] newtype for connection identifiers
//! - **Sessions**: [`Session`] holding the per-connection numeric value
//! - **Protocol**: [`ClientEvent`] / [`ServerEvent`] wire events
//! - **Errors**: admission and protocol failures via `thiserror`
//! - **Logging**: `tracing` subscriber setup and test log capture

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod session;

pub use errors::{AdmissionError, ProtocolError};
pub use ids::ClientId;
pub use protocol::{ClientEvent, ServerEvent};
pub use session::{MAX_SESSIONS, Session};

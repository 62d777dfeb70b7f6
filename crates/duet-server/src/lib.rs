//! # duet-server
//!
//! Axum HTTP + `WebSocket` server for the two-client value relay.
//!
//! - HTTP endpoints: `/` and `/elm.js` from the assets directory, `/health`, `/metrics`
//! - `WebSocket` gateway at `/ws`: admission, heartbeat, frame decoding
//! - Session registry owned by a single actor task; at most two live sessions
//! - `setValue` from one client is relayed to the other as `setOther`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod assets;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{RegistryError, ServerError};
pub use server::DuetServer;

//! WebSocket connection state, frame decoding and the per-client session loop.

pub mod connection;
pub mod handler;
pub mod session;

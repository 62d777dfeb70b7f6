//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the registry is running, `"degraded"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live sessions.
    pub sessions: usize,
    /// Session cap.
    pub max_sessions: usize,
}

/// Build a health response. `sessions` is `None` when the registry did not
/// answer.
pub fn health_check(start_time: Instant, sessions: Option<usize>, max_sessions: usize) -> HealthResponse {
    HealthResponse {
        status: if sessions.is_some() { "ok" } else { "degraded" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        sessions: sessions.unwrap_or(0),
        max_sessions,
    }
}

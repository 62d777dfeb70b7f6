//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle that renders metrics without touching the global recorder.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// WebSocket upgrades accepted into the registry (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Upgrades refused by the registry (counter, labels: reason).
pub const WS_REJECTIONS_TOTAL: &str = "ws_rejections_total";
/// Admitted connections that closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Outbound frames dropped on a full or closed queue (counter).
pub const WS_DROPPED_MESSAGES_TOTAL: &str = "ws_dropped_messages_total";
/// Lifetime of admitted connections (histogram, seconds).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Live sessions in the registry (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// `setValue` events applied (counter).
pub const VALUE_UPDATES_TOTAL: &str = "value_updates_total";
/// Inbound frames that failed to decode (counter).
pub const INVALID_MESSAGES_TOTAL: &str = "invalid_messages_total";

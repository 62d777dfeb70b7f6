//! Settings types. Every field has a compiled default, so a partial (or
//! absent) settings file is always valid.

use duet_core::logging::{LogFormat, LogLevel};
use serde::{Deserialize, Serialize};

/// Root settings object (`~/.duet/settings.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuetSettings {
    /// HTTP / WebSocket server settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// HTTP / WebSocket server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Directory holding `index.html` and `elm.js`.
    pub assets_dir: String,
    /// Outbound messages buffered per connection before dropping.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            assets_dir: "assets".into(),
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            max_message_size: 64 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (overridden by `RUST_LOG`).
    pub level: LogLevel,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl LoggingSettings {
    /// Output format implied by [`Self::json`].
    pub fn format(&self) -> LogFormat {
        LogFormat::from_json_flag(self.json)
    }
}

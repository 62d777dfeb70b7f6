//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DuetSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `DUET_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use duet_core::logging::LogLevel;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::DuetSettings;

/// Resolve the default settings file path (`~/.duet/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".duet").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<DuetSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Read and merge the settings file over defaults, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<DuetSettings> {
    let defaults = serde_json::to_value(DuetSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut DuetSettings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup.
///
/// Recognized keys: `DUET_HOST`, `DUET_PORT`, `DUET_ASSETS_DIR`,
/// `DUET_HEARTBEAT_INTERVAL`, `DUET_LOG_LEVEL`, `DUET_LOG_JSON`. Empty or
/// unparsable values are ignored with a warning.
pub fn apply_overrides_from(settings: &mut DuetSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = string("DUET_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("DUET_PORT").and_then(|v| parse_checked("DUET_PORT", &v, 1..=65535)) {
        settings.server.port = v;
    }
    if let Some(v) = string("DUET_ASSETS_DIR") {
        settings.server.assets_dir = v;
    }
    if let Some(v) = string("DUET_HEARTBEAT_INTERVAL")
        .and_then(|v| parse_checked("DUET_HEARTBEAT_INTERVAL", &v, 1..=3600))
    {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = string("DUET_LOG_LEVEL") {
        settings.logging.level = LogLevel::from_str_lossy(&v);
    }
    if let Some(v) = string("DUET_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => tracing::warn!(key = "DUET_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &DuetSettings) -> Result<()> {
    let server = &settings.server;
    if server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueCapacity must be at least 1".into(),
        ));
    }
    if server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalSecs must be at least 1".into(),
        ));
    }
    if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
        return Err(SettingsError::InvalidValue(format!(
            "server.heartbeatTimeoutSecs ({}) must not be shorter than the interval ({})",
            server.heartbeat_timeout_secs, server.heartbeat_interval_secs
        )));
    }
    if server.max_message_size == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxMessageSize must be at least 1".into(),
        ));
    }
    Ok(())
}

fn parse_checked<T>(key: &str, raw: &str, range: std::ops::RangeInclusive<T>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let parsed = raw.trim().parse::<T>().ok().filter(|v| range.contains(v));
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "invalid numeric env var, ignoring");
    }
    parsed
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

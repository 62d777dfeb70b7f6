//! # duet-settings
//!
//! Layered configuration: compiled defaults, then `~/.duet/settings.json`,
//! then `DUET_*` environment variables. Command-line flags are applied on
//! top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings_from_path, settings_path};
pub use types::{DuetSettings, LoggingSettings, ServerSettings};

//! # duet
//!
//! Duet server binary: loads settings, starts the HTTP/WebSocket server and
//! waits for Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use duet_core::logging::{self, LogLevel};
use duet_server::config::ServerConfig;
use duet_server::server::DuetServer;
use duet_settings::DuetSettings;

/// Two-client value relay demo server.
#[derive(Parser, Debug)]
#[command(name = "duet", about = "Two-client value relay demo server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding `index.html` and `elm.js` (overrides settings).
    #[arg(long)]
    assets_dir: Option<PathBuf>,

    /// Settings file (default `~/.duet/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Seconds to wait for connections to drain on shutdown.
    #[arg(long, default_value = "10")]
    shutdown_timeout_secs: u64,
}

impl Cli {
    /// Apply command-line flags on top of loaded settings.
    fn apply(&self, settings: &mut DuetSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref dir) = self.assets_dir {
            settings.server.assets_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level = LogLevel::from_str_lossy(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

/// Defaults, then the settings file, then `DUET_*` env vars, then flags.
fn resolve_settings(cli: &Cli) -> Result<DuetSettings> {
    let path = cli.settings.clone().unwrap_or_else(duet_settings::settings_path);
    let mut settings = duet_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    logging::init_subscriber(settings.logging.level, settings.logging.format());

    let metrics = duet_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings.server);
    let server = DuetServer::new(config, metrics);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("duet listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(
            vec![handle],
            Some(Duration::from_secs(cli.shutdown_timeout_secs)),
        )
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}

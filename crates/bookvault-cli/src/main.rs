//! BookVault CLI - a command-line shell for the library circulation service.
//!
//! The shell owns user-facing rendering: it subscribes once to the session's
//! forced-logout notices and prints them, and maps request errors to
//! readable messages. Everything stateful lives in `bookvault-core`.

mod cli;
mod commands;
mod format;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookvault_core::api::ApiClient;
use bookvault_core::auth::{SessionController, SessionStore, SystemClock};
use bookvault_core::config::Config;

use cli::Cli;
use commands::Shell;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default().with_env()
        }
    };
    if let Some(url) = cli.api_url.clone() {
        config.api_base_url = url;
    }

    let store = SessionStore::new(config.session_dir()?);
    let session = SessionController::with_clock(
        store,
        Arc::new(SystemClock),
        config.session_check_interval(),
    );
    let notices = session.subscribe_forced_logout();
    let phase = session.start();
    info!(?phase, api = %config.api_base_url, "Session resolved");

    let api = ApiClient::new(config.api_base_url.clone(), session)
        .context("Failed to create API client")?;

    let mut shell = Shell::new(api, config, notices);
    let result = shell.run(cli.command).await;
    shell.render_notices();
    result
}

//! Commonroom CLI - a command line front end for the Commonroom API.
//!
//! Every backend endpoint is reachable as a subcommand; responses are
//! printed as pretty JSON on stdout, logs go to stderr.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commonroom_core::{open_store, ApiClient, Config, Navigator};

use commands::Cli;

/// Directory for an optional daily log file
const ENV_LOG_DIR: &str = "COMMONROOM_LOG_DIR";

/// Log file name prefix inside `COMMONROOM_LOG_DIR`
const LOG_FILE_PREFIX: &str = "commonroom.log";

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so the file writer flushes.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Tells the user to sign in again when the backend rejects the session.
struct CliNavigator;

impl Navigator for CliNavigator {
    fn redirect(&self, path: &str) {
        warn!(path, "Session rejected by backend");
        eprintln!("Your session is no longer valid. Run `commonroom login` to sign in again.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();

    let config = Config::load()?;
    info!(api_url = %config.api_url, store = ?config.store, "Commonroom CLI starting");

    let store = open_store(&config)?;
    let client = ApiClient::from_config(&config, store, Arc::new(CliNavigator))?;

    commands::run(&client, cli.command).await
}

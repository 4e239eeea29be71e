//! AI Insight CLI - a terminal front end for the AI Insight dashboard.
//!
//! Logs in against the backend, asks for AI analyses of a topic, and manages
//! user accounts for administrators. The session persists between runs in the
//! configured credential store.

mod app;
mod commands;
mod format;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use commands::Cli;

/// Log file name prefix used with `--log-file <dir>`
const LOG_FILE_PREFIX: &str = "insight.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=insight_core=debug).
/// With a log directory, output also goes to a daily rolling file; the
/// returned guard must stay alive until exit so buffered lines are flushed.
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file);

    info!(command = ?cli.command, "AI Insight CLI starting");
    let mut app = App::new()?;
    let result = app.run(cli.command).await;

    if let Err(ref e) = result {
        eprintln!("Error: {:#}", e);
    }

    info!("AI Insight CLI shutting down");
    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

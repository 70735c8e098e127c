//! taskcast - command-line client for the deadline forecasting dashboard.
//!
//! Signs in against the dashboard backend and keeps the session token
//! between runs.

mod app;
mod prompt;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, Command};

// ============================================================================
// Constants
// ============================================================================

/// Log file name prefix inside `<cache>/taskcast/logs`
const LOG_FILE_PREFIX: &str = "taskcast.log";

/// Set to any value to also write logs to a daily file.
const ENV_LOG_FILE: &str = "TASKCAST_LOG_FILE";

const USAGE: &str = "\
Usage: taskcast <command>

Commands:
  status               Resume the stored session and show who is signed in (default)
  login [username]     Sign in
  register             Create an account and sign in
  logout               Sign out and forget the stored token
  whoami               Show the signed-in profile
  users [skip] [limit] List accounts
  help                 Show this message

Environment:
  TASKCAST_API_URL        Backend base URL (default http://localhost:8000)
  TASKCAST_TOKEN_BACKEND  file | keyring | memory
  TASKCAST_TIMEOUT_SECS   Request timeout in seconds
  TASKCAST_LOG_FILE       Also log to a daily file in the cache directory
  RUST_LOG                Log filter (default warn)";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer on drop and must outlive main.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn log_dir() -> Option<std::path::PathBuf> {
    std::env::var_os(ENV_LOG_FILE)?;
    dirs::cache_dir().map(|dir| dir.join(taskcast_core::config::APP_NAME).join("logs"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return Ok(());
        }
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let log_guard = init_tracing();
    info!(?command, "taskcast starting");

    let mut app = App::new()?;
    let result = app.run(command).await;
    info!("taskcast shutting down");

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        // Flush the log file before exiting
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

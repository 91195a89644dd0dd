use color_eyre::{eyre::eyre, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,catalog_client=debug";
const LOG_FILE: &str = "catalog.log";

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Directory holding the log file: `$XDG_STATE_HOME/catalog`, or the data
/// directory on platforms without a state directory.
pub fn log_dir() -> Option<PathBuf> {
  dirs::state_dir()
    .or_else(dirs::data_dir)
    .map(|dir| dir.join("catalog"))
}

/// Initialize structured logging to `catalog.log` in [`log_dir`].
///
/// Keep the returned guard alive until exit so buffered lines get flushed.
pub fn init_logging() -> Result<WorkerGuard> {
  let dir = log_dir().ok_or_else(|| eyre!("Could not determine a log directory"))?;
  fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  tracing::info!("catalog logging initialized at {}", dir.join(LOG_FILE).display());
  Ok(guard)
}

/// Log to stderr instead, for when the log file cannot be opened.
pub fn init_logging_stderr() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(std::io::stderr)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))
}

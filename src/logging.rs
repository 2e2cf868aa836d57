//! File logging for scopeline using the tracing crate.
//!
//! Log lines go to daily-rotated files under the XDG state directory and never
//! to the terminal, since stdout belongs to the oscilloscope screen. Only the
//! 7 most recent log files are kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;

const LOG_FILE_PREFIX: &str = "scopeline.log";
const MAX_LOG_FILES: usize = 7;

/// Keeps the non-blocking writer alive for the program lifetime.
static APPENDER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Installs the global subscriber.
///
/// The level comes from `RUST_LOG` and defaults to "info".
///
/// # Errors
/// - If the log directory cannot be determined or created
/// - If logging was already initialized
pub fn init_logging() -> Result<(), anyhow::Error> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    if let Err(e) = cleanup_old_logs(&log_dir) {
        eprintln!("Warning: Failed to cleanup old logs: {e}");
    }

    let file_appender = rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    APPENDER_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Logging already initialized"))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_ansi(false),
        )
        .init();

    tracing::debug!("Logging initialized. Log directory: {}", log_dir.display());
    Ok(())
}

/// `$XDG_STATE_HOME/scopeline`, or `~/.local/state/scopeline`.
pub fn log_dir() -> Result<PathBuf, anyhow::Error> {
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg_state).join("scopeline"));
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(home.join(".local/state/scopeline"))
}

/// Rotated log files in `log_dir`, newest first.
pub fn log_files(log_dir: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let file_name = path.file_name()?.to_str()?;
            if !file_name.starts_with(LOG_FILE_PREFIX) {
                return None;
            }
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            Some((path, modified))
        })
        .collect();

    files.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(files.into_iter().map(|(path, _)| path).collect())
}

fn cleanup_old_logs(log_dir: &Path) -> Result<(), anyhow::Error> {
    for path in log_files(log_dir)?.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Warning: Failed to delete old log file {}: {e}", path.display());
        }
    }
    Ok(())
}

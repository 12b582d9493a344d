//! Shared logging utilities for Attimo binaries.
//!
//! Logs go to a daily-rolling file under the Attimo home and to stderr.
//! stdout is left to command output.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "attimo=info,attimo_db=info";

/// Logging configuration shared by Attimo binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Directory for log files; `None` means `<home>/logs`
    pub log_dir: Option<&'a Path>,
    /// Filter used when `RUST_LOG` is unset
    pub filter: Option<&'a str>,
    /// Mirror the file filter on stderr instead of only warnings
    pub verbose: bool,
}

/// Initialize tracing with a daily rolling file writer and stderr output.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the life of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = match config.log_dir {
        Some(dir) => ensure_dir(dir)?,
        None => ensure_logs_dir()?,
    };

    let file_appender =
        tracing_appender::rolling::daily(&log_dir, format!("{}.log", sanitize_name(config.app_name)));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = config.filter.unwrap_or(DEFAULT_LOG_FILTER);
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Get the Attimo home directory: `$ATTIMO_HOME`, else `~/.attimo`.
///
/// Falls back to `./.attimo` when no home directory can be determined.
pub fn attimo_home() -> PathBuf {
    if let Some(override_path) = std::env::var_os("ATTIMO_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".attimo")
}

/// Get the logs directory: `<home>/logs`
pub fn logs_dir() -> PathBuf {
    attimo_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    ensure_dir(&logs_dir())
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir.to_path_buf())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

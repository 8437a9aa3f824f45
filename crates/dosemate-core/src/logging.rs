//! Logging infrastructure for DoseMate.
//!
//! Structured logging using the `tracing` ecosystem. The notifier logs every
//! reminder transition with `reminder_id` and `kind` fields so a session can
//! be reconstructed from the JSON log alone.
//!
//! ## Features
//!
//! - JSON lines format for machine parsing
//! - File output to `~/.dosemate/logs/dosemate.log` (rolled daily)
//! - Console output to stderr with configurable verbosity
//!
//! ## Example
//!
//! ```no_run
//! use dosemate_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("DoseMate started");
//! tracing::debug!(reminder_id = "42", "reminder activated");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{CoreError, Result};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the DoseMate logging system.
///
/// This sets up:
/// - File logging to `~/.dosemate/logs/dosemate.log` (JSON lines format)
/// - Console logging to stderr (human-readable format)
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.dosemate/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
///
/// `RUST_LOG`, when set, replaces the level chosen by `verbose`.
///
/// # Returns
///
/// A [`LogGuard`] that must be held for the application lifetime to ensure
/// logs are properly flushed on shutdown.
///
/// # Errors
///
/// Fails if the home directory is unknown or the log directory cannot be
/// created.
///
/// # Example
///
/// ```no_run
/// use dosemate_core::logging;
///
/// fn main() -> dosemate_core::Result<()> {
///     let _guard = logging::init_logging(None, false)?;
///     tracing::info!("Notifier started");
///     Ok(())
/// }
/// ```
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| CoreError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "dosemate.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dosemate={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Base directory for DoseMate state: `~/.dosemate/`
pub fn dosemate_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| CoreError::Internal {
        message: "HOME environment variable not set".into(),
    })?;

    Ok(PathBuf::from(home).join(".dosemate"))
}

/// Get the default log directory path.
///
/// Returns `~/.dosemate/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(dosemate_home()?.join("logs"))
}

/// Get the default log file path.
pub fn default_log_file() -> Result<PathBuf> {
    Ok(default_log_dir()?.join("dosemate.log"))
}

/// Log a reminder lifecycle event under the `dosemate::reminder` target.
///
/// # Example
///
/// ```ignore
/// log_reminder_event!(&id, "activated");
/// log_reminder_event!(&id, "escalated", status = "PENDING");
/// ```
#[macro_export]
macro_rules! log_reminder_event {
    ($reminder_id:expr, $event:expr) => {
        tracing::info!(
            target: "dosemate::reminder",
            reminder_id = %$reminder_id,
            event = $event,
            "reminder event"
        )
    };
    ($reminder_id:expr, $event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "dosemate::reminder",
            reminder_id = %$reminder_id,
            event = $event,
            $($field)*,
            "reminder event"
        )
    };
}

//! # dosemate-core
//!
//! Core types, errors, and utilities shared by the DoseMate crates.
//!
//! This crate provides:
//! - [`CoreError`] - Error type for configuration, I/O and parsing failures
//! - [`logging`] - Tracing setup and log file locations
//! - [`types`] - Reminder domain types shared with the backend API
//!
//! ## Example
//!
//! ```no_run
//! use dosemate_core::{logging, CoreError};
//!
//! fn main() -> dosemate_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let config_path = std::path::Path::new("~/.dosemate/config.yaml");
//!     if !config_path.exists() {
//!         return Err(CoreError::config_not_found(config_path));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{CoreError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{ReminderId, ReminderStatus, ReminderSummary};

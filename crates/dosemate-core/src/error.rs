//! Error types shared across DoseMate crates.
//!
//! [`CoreError`] covers the failures that can happen before the notifier is
//! running: locating and parsing configuration, preparing log directories,
//! and decoding reminder identifiers.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the shared DoseMate infrastructure.
#[derive(Debug, Error)]
pub enum CoreError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// A reminder identifier could not be parsed
    #[error("Invalid reminder id: {raw:?}")]
    InvalidReminderId { raw: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigNotFound error with source
    pub fn config_not_found_with_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: Some(source),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Create ~/.dosemate/config.yaml or pass --config to point at one")
            }
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in the configuration file"),
            Self::InvalidReminderId { .. } => {
                Some("Reminder ids are the numbers shown in the pending list")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_error() {
        let err = CoreError::config_not_found("/home/user/.dosemate/config.yaml");
        assert!(err.to_string().contains("Configuration not found"));
        assert!(err.is_config_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_invalid_reminder_id_message() {
        let err = CoreError::InvalidReminderId { raw: "".into() };
        assert!(err.to_string().contains("Invalid reminder id"));
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_internal_has_no_guidance() {
        assert_eq!(CoreError::internal("bug").guidance(), None);
    }
}

//! Error types for the reminder notifier.

use thiserror::Error;

/// Notifier errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// API request failed (transient, retryable)
    #[error("API request failed (transient): {0}")]
    ApiTransientError(String),

    /// API request failed (permanent)
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Session token missing, expired or rejected
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Reminder unknown to the backend
    #[error("Reminder not found: {0}")]
    NotFound(String),

    /// Network timeout
    #[error("Network timeout: {0}")]
    Timeout(String),

    /// Reminder feed connection failed
    #[error("Reminder feed connection failed: {0}")]
    FeedConnection(String),

    /// Audio backend unavailable or playback rejected
    #[error("Audio playback failed: {0}")]
    Audio(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The notifier task has been disposed
    #[error("Notifier has been shut down")]
    NotifierClosed,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Core error
    #[error("Core error: {0}")]
    CoreError(#[from] dosemate_core::CoreError),
}

impl NotifyError {
    /// Check if this error is retryable (transient network/API issues).
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::ApiTransientError(_)
            | NotifyError::Timeout(_)
            | NotifyError::FeedConnection(_) => true,
            NotifyError::HttpError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if this error is a network-related error.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            NotifyError::ApiTransientError(_)
                | NotifyError::Timeout(_)
                | NotifyError::FeedConnection(_)
                | NotifyError::HttpError(_)
        )
    }

    /// Get a user-friendly error message.
    pub fn friendly_message(&self) -> String {
        match self {
            NotifyError::ApiTransientError(_) | NotifyError::HttpError(_) => {
                "The reminder service is not responding. Please try again.".to_string()
            }
            NotifyError::Timeout(_) => {
                "Request timed out. Check your connection.".to_string()
            }
            NotifyError::Unauthorized(_) => "Your session has expired. Please log in again.".to_string(),
            NotifyError::NotFound(id) => format!("Reminder {} no longer exists.", id),
            NotifyError::FeedConnection(_) => {
                "Live reminders are unavailable. Retrying in the background.".to_string()
            }
            NotifyError::NotifierClosed => "Reminders are no longer active.".to_string(),
            _ => format!("Error: {}", self),
        }
    }

    /// Classify an HTTP status code into appropriate error type.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => NotifyError::Unauthorized(format!("HTTP {}: {}", status, body)),
            404 => NotifyError::NotFound(body.to_string()),
            408 => NotifyError::Timeout(format!("HTTP 408: {}", body)),
            500 | 502 | 503 | 504 => {
                NotifyError::ApiTransientError(format!("Server error ({}): {}", status, body))
            }
            _ => NotifyError::ApiError(format!("HTTP {}: {}", status, body)),
        }
    }
}

/// Result type for notifier operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            NotifyError::from_http_status(401, ""),
            NotifyError::Unauthorized(_)
        ));
        assert!(matches!(
            NotifyError::from_http_status(404, "r1"),
            NotifyError::NotFound(_)
        ));
        assert!(NotifyError::from_http_status(503, "").is_retryable());
        assert!(!NotifyError::from_http_status(400, "bad").is_retryable());
    }

    #[test]
    fn test_closed_is_not_network() {
        assert!(!NotifyError::NotifierClosed.is_network_error());
        assert!(!NotifyError::NotifierClosed.is_retryable());
    }
}

//! Configuration for the reminder notifier.
//!
//! Every field has a compiled-in default, so an absent or partial
//! `~/.dosemate/config.yaml` is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NotifyError, Result};

/// Notifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// REST API base URL
    pub api_base_url: String,

    /// WebSocket URL of the reminder event stream
    pub feed_url: String,

    /// Environment variable holding the bearer token
    pub auth_token_env: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// How long a reminder stays on screen before it is marked PENDING
    pub shown_timeout_secs: u64,

    /// How long a PENDING reminder waits before it is marked MISSED
    pub pending_timeout_secs: u64,

    /// Pause between resolving one alert and showing the next queued one
    pub handoff_delay_ms: u64,

    /// Snooze length used when the caller gives none (or an invalid one)
    pub default_snooze_minutes: u32,

    /// Delay before reconnecting a dropped feed
    pub reconnect_delay_secs: u64,

    /// Alert sound configuration
    pub alert: AlertConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            feed_url: "ws://localhost:8080/ws/reminders".to_string(),
            auth_token_env: "DOSEMATE_TOKEN".to_string(),
            request_timeout_secs: 30,
            shown_timeout_secs: 20,
            pending_timeout_secs: 300,
            handoff_delay_ms: 600,
            default_snooze_minutes: 10,
            reconnect_delay_secs: 5,
            alert: AlertConfig::default(),
        }
    }
}

/// Alert sound configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Whether alerts make any sound
    pub enabled: bool,

    /// PCM WAV clip played on each new active reminder
    pub clip_path: PathBuf,

    /// Frequency of the synthesized fallback beep
    pub tone_hz: f32,

    /// Length of the synthesized fallback beep in milliseconds
    pub tone_ms: u64,

    /// Output gain (0.0 - 1.0)
    pub volume: f32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clip_path: PathBuf::from("assets/notification.wav"),
            tone_hz: 880.0,
            tone_ms: 400,
            volume: 0.25,
        }
    }
}

impl NotifierConfig {
    /// Default config file location: `~/.dosemate/config.yaml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(dosemate_core::logging::dosemate_home()?.join("config.yaml"))
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            NotifyError::CoreError(dosemate_core::CoreError::config_not_found_with_source(path, e))
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| {
            NotifyError::CoreError(dosemate_core::CoreError::ConfigInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from the default location if it
    /// exists, else fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default_path = Self::default_path()?;
        if default_path.exists() {
            Self::from_file(&default_path)
        } else {
            debug!(path = %default_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject values that would make the escalation path meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.shown_timeout_secs == 0 {
            return Err(NotifyError::ConfigError(
                "shown_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.pending_timeout_secs == 0 {
            return Err(NotifyError::ConfigError(
                "pending_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_snooze_minutes == 0 {
            return Err(NotifyError::ConfigError(
                "default_snooze_minutes must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alert.volume) {
            return Err(NotifyError::ConfigError(format!(
                "alert.volume must be within 0.0-1.0, got {}",
                self.alert.volume
            )));
        }
        Ok(())
    }

    /// Bearer token from the configured environment variable, if set.
    pub fn auth_token(&self) -> Option<String> {
        std::env::var(&self.auth_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn shown_timeout(&self) -> Duration {
        Duration::from_secs(self.shown_timeout_secs)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }

    pub fn handoff_delay(&self) -> Duration {
        Duration::from_millis(self.handoff_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Set custom API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set custom feed URL.
    pub fn with_feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = url.into();
        self
    }
}

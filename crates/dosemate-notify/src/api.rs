//! Reminder REST API client.
//!
//! [`ReminderApi`] is the seam between the notifier and the backend. The
//! production implementation, [`HttpReminderApi`], talks to the DoseMate
//! REST service with reqwest; tests substitute a recording fake.
//!
//! ## Endpoints
//!
//! - `PUT  /reminders/{id}/status`  body `{"status": "TAKEN" | "PENDING" | "MISSED"}`
//! - `PUT  /reminders/{id}/snooze`  body `{"minutes": n}`
//! - `GET  /reminders/pending`
//! - `GET  /reminders/upcoming`
//!
//! Reminder ids are pushed as single percent-encoded path segments, so an id
//! containing `/`, `?` or non-ASCII text never changes which endpoint is hit.

use ::async_trait::async_trait;
use dosemate_core::{ReminderId, ReminderStatus, ReminderSummary};
use serde::Serialize;
use reqwest::Url;
use tokio::time::Duration;
use tracing::debug;

use crate::config::NotifierConfig;
use crate::error::{NotifyError, Result};

/// Backend operations the notifier depends on.
#[async_trait]
pub trait ReminderApi: Send + Sync {
    /// Update the server-side status of a reminder.
    async fn update_status(&self, id: &ReminderId, status: ReminderStatus) -> Result<()>;

    /// Push a reminder back by `minutes`.
    async fn snooze(&self, id: &ReminderId, minutes: u32) -> Result<()>;

    /// Reminders currently awaiting the patient.
    async fn pending(&self) -> Result<Vec<ReminderSummary>>;

    /// Reminders scheduled within the next day.
    async fn upcoming(&self) -> Result<Vec<ReminderSummary>>;
}

#[derive(Serialize)]
struct StatusBody {
    status: ReminderStatus,
}

#[derive(Serialize)]
struct SnoozeBody {
    minutes: u32,
}

/// [`ReminderApi`] over HTTP.
pub struct HttpReminderApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpReminderApi {
    /// Create a client from config, reading the token from the configured
    /// environment variable.
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        Self::new(
            &config.api_base_url,
            config.auth_token(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Create a client with an explicit base URL and token.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| NotifyError::ConfigError(format!("Invalid API base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(NotifyError::ConfigError(format!(
                "API base URL cannot carry a path: {}",
                base_url
            )));
        }

        Ok(Self { client, base_url, token })
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(NotifyError::ApiError(format!("Invalid reminder path segment: {:?}", bad)));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NotifyError::ConfigError(format!("API base URL cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::from_http_status(status, &body))
    }

    async fn put_json<B: Serialize + Sync>(&self, segments: &[&str], body: &B) -> Result<()> {
        let url = self.endpoint(segments)?;
        debug!(%url, "PUT");
        let response = self.authorize(self.client.put(url)).json(body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_list(&self, segments: &[&str]) -> Result<Vec<ReminderSummary>> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self.authorize(self.client.get(url)).send().await?;
        let response = Self::check(response).await?;
        response.json().await.map_err(NotifyError::from)
    }
}

#[async_trait]
impl ReminderApi for HttpReminderApi {
    async fn update_status(&self, id: &ReminderId, status: ReminderStatus) -> Result<()> {
        self.put_json(&["reminders", id.as_str(), "status"], &StatusBody { status })
            .await
    }

    async fn snooze(&self, id: &ReminderId, minutes: u32) -> Result<()> {
        self.put_json(&["reminders", id.as_str(), "snooze"], &SnoozeBody { minutes })
            .await
    }

    async fn pending(&self) -> Result<Vec<ReminderSummary>> {
        self.get_list(&["reminders", "pending"]).await
    }

    async fn upcoming(&self) -> Result<Vec<ReminderSummary>> {
        self.get_list(&["reminders", "upcoming"]).await
    }
}

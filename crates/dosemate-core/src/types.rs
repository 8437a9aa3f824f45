//! Reminder domain types shared with the DoseMate backend.
//!
//! The backend serializes reminder ids as integers while push events
//! sometimes carry them as strings, so [`ReminderId`] accepts both and
//! normalizes to a string form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Opaque identifier of a single reminder instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReminderId(String);

impl ReminderId {
    /// Create an id from its textual form.
    ///
    /// Returns `None` for empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == raw.len() {
            Some(Self(raw))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The id as it appears in REST paths.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ReminderId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for ReminderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or_else(|| CoreError::InvalidReminderId { raw: s.to_string() })
    }
}

impl Serialize for ReminderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ReminderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Uint(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(Self::from(n)),
            Raw::Uint(n) => Ok(Self(n.to_string())),
            Raw::Text(s) => {
                Self::new(s).ok_or_else(|| serde::de::Error::custom("empty reminder id"))
            }
        }
    }
}

/// Server-side reminder status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    /// Due or scheduled, awaiting the patient
    Pending,
    /// Pushed to connected clients by the dispatcher
    Triggered,
    /// Patient confirmed the dose
    Taken,
    /// Escalated after no response
    Missed,
    /// Deferred by the patient
    Snoozed,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

impl ReminderStatus {
    /// Wire form used in `PUT /reminders/{id}/status` bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Triggered => "TRIGGERED",
            Self::Taken => "TAKEN",
            Self::Missed => "MISSED",
            Self::Snoozed => "SNOOZED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reminder row as returned by `GET /reminders/pending` and `/upcoming`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSummary {
    pub id: ReminderId,
    #[serde(default)]
    pub medicine_id: Option<i64>,
    #[serde(default)]
    pub medicine_name: Option<String>,
    /// Raw timestamp as sent by the backend (local date-time without zone)
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub status: Option<ReminderStatus>,
    #[serde(default)]
    pub snooze_count: Option<u32>,
}

impl ReminderSummary {
    /// Parsed scheduled time, if present and well formed.
    pub fn scheduled_at_utc(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at.as_deref().and_then(parse_timestamp_str)
    }

    /// Returns true if the reminder is due at `now` (or has no usable time).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at_utc().is_none_or(|at| at <= now)
    }
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, or a zone-less local date-time as the
/// backend emits (`2025-03-01T08:00:00`, optionally with fractional seconds),
/// interpreted in the local timezone.
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

/// Interpret an epoch number as seconds or milliseconds.
///
/// Values past 10^11 cannot be plausible seconds and are read as millis.
pub fn parse_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

//! Reminder feed ingestion.
//!
//! Push events arrive either as a bare reminder object or wrapped in an
//! envelope with a `reminder` field, and the backend has used several field
//! spellings over time. [`normalize`] folds them into a [`ReminderDescriptor`].
//! Events without a usable id are dropped.

use chrono::{DateTime, Utc};
use dosemate_core::types::{parse_epoch, parse_timestamp_str};
use dosemate_core::ReminderId;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Display name used when an event carries no medicine name.
pub const DEFAULT_MEDICINE_NAME: &str = "Medicine";

const ID_FIELDS: &[&str] = &["id", "reminderId", "reminderID"];

/// Canonical, immutable description of one reminder instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDescriptor {
    id: ReminderId,
    medicine_name: String,
    scheduled_at: DateTime<Utc>,
    dosage: Option<String>,
    message: Option<String>,
}

impl ReminderDescriptor {
    pub fn new(id: ReminderId, medicine_name: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id,
            medicine_name: medicine_name.into(),
            scheduled_at,
            dosage: None,
            message: None,
        }
    }

    pub fn id(&self) -> &ReminderId {
        &self.id
    }

    pub fn medicine_name(&self) -> &str {
        &self.medicine_name
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    /// Dose text such as `500 mg`, when the event carried one.
    pub fn dosage(&self) -> Option<&str> {
        self.dosage.as_deref()
    }

    /// Notification body: the server-provided message, or a generated one.
    pub fn body(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match &self.dosage {
            Some(dosage) => format!("Time to take {} ({})", self.medicine_name, dosage),
            None => format!("Time to take {}", self.medicine_name),
        }
    }
}

/// Parse a raw text frame and normalize it.
///
/// Frames that are not JSON are logged and dropped.
pub fn normalize_text(raw: &str, now: DateTime<Utc>) -> Option<ReminderDescriptor> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => normalize(&value, now),
        Err(e) => {
            warn!(error = %e, "reminder event is not valid JSON, dropping");
            None
        }
    }
}

/// Normalize a decoded event payload into a descriptor.
///
/// `now` is used as the scheduled time when the event carries none.
pub fn normalize(payload: &Value, now: DateTime<Utc>) -> Option<ReminderDescriptor> {
    let reminder = match payload.get("reminder") {
        Some(nested @ Value::Object(_)) => nested,
        _ => payload,
    };
    if !reminder.is_object() {
        debug!("reminder event is not an object, dropping");
        return None;
    }

    let Some(id) = ID_FIELDS
        .iter()
        .find_map(|field| reminder.get(*field).and_then(id_from_value))
    else {
        debug!("reminder event has no id, dropping");
        return None;
    };

    let medicine_name = text(reminder.get("medicineName"))
        .or_else(|| text(reminder.pointer("/medicine/name")))
        .or_else(|| text(reminder.get("title")))
        .unwrap_or_else(|| DEFAULT_MEDICINE_NAME.to_string());

    let scheduled_at = timestamp(reminder.get("scheduledAt"))
        .or_else(|| timestamp(reminder.get("time")))
        .unwrap_or(now);

    let dosage = match (scalar_text(reminder.get("dosage")), text(reminder.get("unit"))) {
        (Some(amount), Some(unit)) => Some(format!("{} {}", amount, unit)),
        (Some(amount), None) => Some(amount),
        _ => None,
    };

    Some(ReminderDescriptor {
        id,
        medicine_name,
        scheduled_at,
        dosage,
        message: text(reminder.get("message")),
    })
}

fn id_from_value(value: &Value) -> Option<ReminderId> {
    match value {
        Value::String(s) => ReminderId::new(s.as_str()),
        Value::Number(n) => n
            .as_i64()
            .map(ReminderId::from)
            .or_else(|| n.as_u64().and_then(|v| ReminderId::new(v.to_string()))),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        other => text(Some(other)),
    }
}

fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n.as_i64().and_then(parse_epoch),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_bare_reminder_object() {
        let d = normalize(&json!({"id": "r1", "medicineName": "Aspirin"}), now()).unwrap();
        assert_eq!(d.id().as_str(), "r1");
        assert_eq!(d.medicine_name(), "Aspirin");
        assert_eq!(d.scheduled_at(), now());
    }

    #[test]
    fn test_dispatcher_event_shape() {
        let payload = json!({
            "reminderId": 12,
            "medicineId": 3,
            "medicineName": "Metformin",
            "dosage": 500,
            "unit": "mg",
            "scheduledAt": "2025-03-01T08:00:00Z"
        });
        let d = normalize(&payload, now()).unwrap();
        assert_eq!(d.id().as_str(), "12");
        assert_eq!(d.dosage(), Some("500 mg"));
        assert_eq!(d.body(), "Time to take Metformin (500 mg)");
        assert_eq!(d.scheduled_at().timestamp(), 1_740_816_000);
    }

    #[test]
    fn test_envelope_with_nested_reminder() {
        let payload = json!({
            "type": "REMINDER",
            "reminder": {"reminderID": "abc", "medicine": {"name": "Ibuprofen"}, "time": 1_700_000_600}
        });
        let d = normalize(&payload, now()).unwrap();
        assert_eq!(d.id().as_str(), "abc");
        assert_eq!(d.medicine_name(), "Ibuprofen");
        assert_eq!(d.scheduled_at().timestamp(), 1_700_000_600);
    }

    #[test]
    fn test_id_precedence() {
        let d = normalize(&json!({"id": 1, "reminderId": 2}), now()).unwrap();
        assert_eq!(d.id().as_str(), "1");
        let d = normalize(&json!({"id": null, "reminderId": 2}), now()).unwrap();
        assert_eq!(d.id().as_str(), "2");
    }

    #[test]
    fn test_name_fallbacks() {
        let d = normalize(&json!({"id": 1, "title": "Evening dose"}), now()).unwrap();
        assert_eq!(d.medicine_name(), "Evening dose");
        let d = normalize(&json!({"id": 1}), now()).unwrap();
        assert_eq!(d.medicine_name(), DEFAULT_MEDICINE_NAME);
        assert_eq!(d.body(), "Time to take Medicine");
    }

    #[test]
    fn test_missing_id_is_dropped() {
        assert!(normalize(&json!({"medicineName": "Aspirin"}), now()).is_none());
        assert!(normalize(&json!({"id": ""}), now()).is_none());
        assert!(normalize(&json!(["not", "an", "object"]), now()).is_none());
        assert!(normalize_text("{broken", now()).is_none());
    }

    #[test]
    fn test_unparseable_time_defaults_to_now() {
        let d = normalize(&json!({"id": 5, "scheduledAt": "soon"}), now()).unwrap();
        assert_eq!(d.scheduled_at(), now());
    }

    #[test]
    fn test_server_message_wins() {
        let d = normalize(&json!({"id": 5, "message": "Take with food"}), now()).unwrap();
        assert_eq!(d.body(), "Take with food");
    }
}

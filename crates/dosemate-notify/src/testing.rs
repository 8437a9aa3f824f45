//! Test doubles for the notifier's collaborators.
//!
//! [`RecordingApi`] stands in for the REST backend and [`RecordingBackend`]
//! for an audio device. Both are cheap to clone; clones share their logs so
//! a test can keep one copy while the notifier owns another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use ::async_trait::async_trait;
use dosemate_core::{ReminderId, ReminderStatus, ReminderSummary};

use crate::alert::AlertBackend;
use crate::api::ReminderApi;
use crate::error::{NotifyError, Result};

/// One call received by [`RecordingApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Status(ReminderId, ReminderStatus),
    Snooze(ReminderId, u32),
    Pending,
    Upcoming,
}

#[derive(Default)]
struct ApiState {
    calls: Vec<ApiCall>,
    pending: Vec<ReminderSummary>,
    upcoming: Vec<ReminderSummary>,
    fail_mutations: HashSet<ReminderId>,
    fail_lists: bool,
}

/// In-memory [`ReminderApi`] that records every call.
#[derive(Clone, Default)]
pub struct RecordingApi {
    state: Arc<Mutex<ApiState>>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lists returned by `pending()` / `upcoming()`.
    pub fn set_lists(&self, pending: Vec<ReminderSummary>, upcoming: Vec<ReminderSummary>) {
        let mut state = self.lock();
        state.pending = pending;
        state.upcoming = upcoming;
    }

    /// Make status and snooze calls for `id` fail with a server error.
    pub fn fail_mutations_for(&self, id: &ReminderId) {
        self.lock().fail_mutations.insert(id.clone());
    }

    /// Make list calls fail with a server error.
    pub fn fail_lists(&self, fail: bool) {
        self.lock().fail_lists = fail;
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Status updates sent for `id`, in order.
    pub fn statuses_for(&self, id: &ReminderId) -> Vec<ReminderStatus> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::Status(call_id, status) if call_id == id => Some(*status),
                _ => None,
            })
            .collect()
    }

    /// Number of status updates to `status` across all reminders.
    pub fn count_status(&self, status: ReminderStatus) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ApiCall::Status(_, s) if *s == status))
            .count()
    }

    pub fn list_fetches(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ApiCall::Pending))
            .count()
    }

    fn mutation(&self, id: &ReminderId, call: ApiCall) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.fail_mutations.contains(id) {
            return Err(NotifyError::from_http_status(503, "unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReminderApi for RecordingApi {
    async fn update_status(&self, id: &ReminderId, status: ReminderStatus) -> Result<()> {
        self.mutation(id, ApiCall::Status(id.clone(), status))
    }

    async fn snooze(&self, id: &ReminderId, minutes: u32) -> Result<()> {
        self.mutation(id, ApiCall::Snooze(id.clone(), minutes))
    }

    async fn pending(&self) -> Result<Vec<ReminderSummary>> {
        let mut state = self.lock();
        state.calls.push(ApiCall::Pending);
        if state.fail_lists {
            return Err(NotifyError::from_http_status(500, "boom"));
        }
        Ok(state.pending.clone())
    }

    async fn upcoming(&self) -> Result<Vec<ReminderSummary>> {
        let mut state = self.lock();
        state.calls.push(ApiCall::Upcoming);
        if state.fail_lists {
            return Err(NotifyError::from_http_status(500, "boom"));
        }
        Ok(state.upcoming.clone())
    }
}

#[derive(Default)]
struct BackendLog {
    starts: usize,
    halts: usize,
}

/// [`AlertBackend`] that counts calls instead of making sound.
#[derive(Clone)]
pub struct RecordingBackend {
    name: String,
    fail: bool,
    log: Arc<Mutex<BackendLog>>,
}

impl RecordingBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            log: Arc::default(),
        }
    }

    /// A backend whose `start` always fails.
    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackendLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    pub fn halts(&self) -> usize {
        self.lock().halts
    }
}

impl AlertBackend for RecordingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<()> {
        self.lock().starts += 1;
        if self.fail {
            Err(NotifyError::Audio(format!("{} unavailable", self.name)))
        } else {
            Ok(())
        }
    }

    fn halt(&mut self) {
        self.lock().halts += 1;
    }
}

/// Build a list row for tests.
pub fn summary(id: i64, name: &str, scheduled_at: &str, status: ReminderStatus) -> ReminderSummary {
    ReminderSummary {
        id: ReminderId::from(id),
        medicine_id: None,
        medicine_name: Some(name.to_string()),
        scheduled_at: Some(scheduled_at.to_string()),
        status: Some(status),
        snooze_count: Some(0),
    }
}

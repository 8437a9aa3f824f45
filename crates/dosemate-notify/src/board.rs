//! Last-known pending and upcoming reminder lists.

use chrono::{DateTime, Utc};
use dosemate_core::{ReminderId, ReminderStatus, ReminderSummary};
use tracing::{debug, warn};

use crate::error::Result;

/// Message shown when a list refresh fails.
pub const LOAD_FAILED: &str = "Failed to load reminders";

/// Result of applying a completed refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// This was the first refresh that succeeded.
    pub first_load: bool,
    /// Another refresh was requested while this one was in flight.
    pub rerun: bool,
}

/// Server-side reminder lists as last fetched.
///
/// At most one refresh is in flight. Requests made meanwhile are coalesced
/// into a single follow-up refresh.
#[derive(Debug, Default)]
pub struct ReminderBoard {
    pending: Vec<ReminderSummary>,
    upcoming: Vec<ReminderSummary>,
    loading: bool,
    rerun: bool,
    loaded_once: bool,
    last_error: Option<String>,
}

impl ReminderBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a refresh. Returns true if the caller should start fetching.
    pub fn request_refresh(&mut self) -> bool {
        if self.loading {
            self.rerun = true;
            return false;
        }
        self.loading = true;
        true
    }

    /// Apply fetched lists. On failure the previous lists stay in place.
    /// Success clears a load error but not an error from a user action.
    pub fn apply(&mut self, result: Result<(Vec<ReminderSummary>, Vec<ReminderSummary>)>) -> RefreshOutcome {
        self.loading = false;
        let rerun = std::mem::take(&mut self.rerun);
        match result {
            Ok((pending, upcoming)) => {
                debug!(pending = pending.len(), upcoming = upcoming.len(), "reminder lists refreshed");
                self.pending = pending;
                self.upcoming = upcoming;
                if self.last_error.as_deref() == Some(LOAD_FAILED) {
                    self.last_error = None;
                }
                let first_load = !self.loaded_once;
                self.loaded_once = true;
                RefreshOutcome { first_load, rerun }
            }
            Err(e) => {
                warn!(error = %e, "reminder list refresh failed");
                self.last_error = Some(LOAD_FAILED.to_string());
                RefreshOutcome {
                    first_load: false,
                    rerun,
                }
            }
        }
    }

    /// Drop `id` from the pending list ahead of server confirmation.
    pub fn remove_pending(&mut self, id: &ReminderId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|r| &r.id != id);
        self.pending.len() != before
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Ids listed as PENDING and already due at `now`.
    pub fn due_pending_ids(&self, now: DateTime<Utc>) -> Vec<ReminderId> {
        self.pending
            .iter()
            .filter(|r| r.status == Some(ReminderStatus::Pending) && r.is_due(now))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn pending(&self) -> &[ReminderSummary] {
        &self.pending
    }

    pub fn upcoming(&self) -> &[ReminderSummary] {
        &self.upcoming
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::testing::summary;

    fn lists() -> (Vec<ReminderSummary>, Vec<ReminderSummary>) {
        (
            vec![
                summary(1, "Aspirin", "2020-01-01T08:00:00Z", ReminderStatus::Pending),
                summary(2, "Metformin", "2999-01-01T08:00:00Z", ReminderStatus::Pending),
                summary(3, "Ibuprofen", "2020-01-01T09:00:00Z", ReminderStatus::Snoozed),
            ],
            vec![summary(4, "Vitamin D", "2999-01-01T08:00:00Z", ReminderStatus::Pending)],
        )
    }

    #[test]
    fn test_refresh_requests_coalesce() {
        let mut board = ReminderBoard::new();
        assert!(board.request_refresh());
        assert!(!board.request_refresh());
        assert!(!board.request_refresh());
        assert!(board.is_loading());

        let outcome = board.apply(Ok(lists()));
        assert!(outcome.rerun);
        assert!(!board.is_loading());

        assert!(board.request_refresh());
        assert!(!board.apply(Ok(lists())).rerun);
    }

    #[test]
    fn test_first_load_reported_once() {
        let mut board = ReminderBoard::new();
        board.request_refresh();
        assert!(!board.apply(Err(NotifyError::Timeout("slow".into()))).first_load);
        board.request_refresh();
        assert!(board.apply(Ok(lists())).first_load);
        board.request_refresh();
        assert!(!board.apply(Ok(lists())).first_load);
    }

    #[test]
    fn test_failure_keeps_stale_lists() {
        let mut board = ReminderBoard::new();
        board.request_refresh();
        board.apply(Ok(lists()));
        board.request_refresh();
        board.apply(Err(NotifyError::from_http_status(500, "boom")));

        assert_eq!(board.pending().len(), 3);
        assert_eq!(board.upcoming().len(), 1);
        assert_eq!(board.last_error(), Some(LOAD_FAILED));

        board.request_refresh();
        board.apply(Ok(lists()));
        assert_eq!(board.last_error(), None);

        board.set_error("Failed to mark taken");
        board.request_refresh();
        board.apply(Ok(lists()));
        assert_eq!(board.last_error(), Some("Failed to mark taken"));
    }

    #[test]
    fn test_due_pending_ids_skip_future_and_other_statuses() {
        let mut board = ReminderBoard::new();
        board.request_refresh();
        board.apply(Ok(lists()));
        assert_eq!(board.due_pending_ids(Utc::now()), vec![ReminderId::from(1)]);
    }

    #[test]
    fn test_remove_pending() {
        let mut board = ReminderBoard::new();
        board.request_refresh();
        board.apply(Ok(lists()));
        assert!(board.remove_pending(&ReminderId::from(2)));
        assert!(!board.remove_pending(&ReminderId::from(2)));
        assert_eq!(board.pending().len(), 2);
    }
}

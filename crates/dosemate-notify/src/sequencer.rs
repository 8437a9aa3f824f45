//! Notification sequencing and escalation.
//!
//! The [`Sequencer`] owns the single active-notification slot, the FIFO of
//! reminders waiting for it, the escalation timers, and the alert player.
//! It is driven by one task (see [`crate::notifier`]); nothing here locks.
//!
//! Per reminder id the observable phases are:
//!
//! ```text
//!   ingest ──► Queued ──► Active ──(shown timeout)──► PendingEscalation ──(pending timeout)──► Missed
//!                 │          │                               │
//!                 └──────────┴──── taken / snoozed ──────────┴──► Idle
//! ```
//!
//! The phases are exclusive. A re-sent event for an id in
//! `PendingEscalation` is ignored, and a queued copy that reaches the slot
//! after its id timed out cancels the old pending timer before it is shown.
//!
//! Between resolving one active reminder and activating the next there is a
//! short handoff pause. During it the slot is occupied by `Handoff`, so new
//! arrivals queue behind the ones already waiting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dosemate_core::{log_reminder_event, ReminderId, ReminderStatus};
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::alert::AlertPlayer;
use crate::api::ReminderApi;
use crate::ingest::ReminderDescriptor;
use crate::notifier::Command;
use crate::timers::{EscalationDelays, TimerBank, TimerFired, TimerKind};

/// How many recently missed ids are remembered for display.
const MISSED_HISTORY: usize = 32;

/// Why the active notification went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Patient took the dose
    Taken,
    /// Patient deferred the reminder
    Snoozed,
    /// Nobody responded while it was on screen
    ShownTimeout,
}

/// Where a reminder id currently sits in the escalation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPhase {
    Idle,
    Queued,
    Active,
    PendingEscalation,
    Missed,
}

enum Slot {
    Idle,
    Active(ReminderDescriptor),
    Handoff,
}

/// Single-slot notification state machine.
pub struct Sequencer {
    slot: Slot,
    queue: VecDeque<ReminderDescriptor>,
    timers: TimerBank<Command>,
    alert: AlertPlayer,
    api: Arc<dyn ReminderApi>,
    tx: WeakUnboundedSender<Command>,
    handoff_delay: Duration,
    handoff: Option<JoinHandle<()>>,
    missed: VecDeque<ReminderId>,
    disposed: bool,
}

impl Sequencer {
    pub(crate) fn new(
        tx: &UnboundedSender<Command>,
        delays: EscalationDelays,
        handoff_delay: Duration,
        api: Arc<dyn ReminderApi>,
        alert: AlertPlayer,
    ) -> Self {
        Self {
            slot: Slot::Idle,
            queue: VecDeque::new(),
            timers: TimerBank::new(tx, delays),
            alert,
            api,
            tx: tx.downgrade(),
            handoff_delay,
            handoff: None,
            missed: VecDeque::new(),
            disposed: false,
        }
    }

    /// Show `descriptor` now if the slot is free, otherwise queue it.
    ///
    /// A reminder already counting down to MISSED is not shown again: the
    /// backend re-sends due PENDING reminders, and restarting escalation on
    /// every re-send would keep it from ever being marked missed.
    pub fn ingest(&mut self, descriptor: ReminderDescriptor) {
        if self.disposed {
            debug!(reminder_id = %descriptor.id(), "sequencer disposed, ignoring reminder");
            return;
        }
        if self.timers.is_armed(descriptor.id(), TimerKind::Pending) {
            debug!(reminder_id = %descriptor.id(), "reminder already escalating, ignoring re-send");
            return;
        }
        match self.slot {
            Slot::Idle => self.activate(descriptor),
            Slot::Active(_) | Slot::Handoff => {
                log_reminder_event!(descriptor.id(), "queued", position = self.queue.len());
                self.queue.push_back(descriptor);
            }
        }
    }

    /// Put `descriptor` on screen. A queued copy of a reminder that has since
    /// timed out restarts its escalation, so its pending timer is dropped.
    fn activate(&mut self, descriptor: ReminderDescriptor) {
        self.missed.retain(|id| id != descriptor.id());
        self.timers.cancel(descriptor.id(), TimerKind::Pending);
        self.alert.play();
        self.timers.start_shown(descriptor.id(), Command::Timer);
        log_reminder_event!(descriptor.id(), "activated", medicine = descriptor.medicine_name());
        self.slot = Slot::Active(descriptor);
    }

    /// Take the active notification off screen.
    ///
    /// Returns the resolved descriptor, or `None` if nothing was active.
    pub fn resolve_active(&mut self, reason: Resolution) -> Option<ReminderDescriptor> {
        let descriptor = match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Active(descriptor) => descriptor,
            other => {
                self.slot = other;
                return None;
            }
        };
        let id = descriptor.id().clone();

        self.alert.stop();
        self.timers.cancel(&id, TimerKind::Shown);
        match reason {
            Resolution::Taken | Resolution::Snoozed => {
                self.timers.cancel(&id, TimerKind::Pending);
                log_reminder_event!(id, "resolved", reason = ?reason);
            }
            Resolution::ShownTimeout => {
                log_reminder_event!(id, "escalated", status = "PENDING");
                self.send_status(id.clone(), ReminderStatus::Pending);
                self.timers.start_pending(&id, Command::Timer);
            }
        }

        self.begin_handoff();
        Some(descriptor)
    }

    /// Apply a user action to `id`, whether it is active, queued, or
    /// escalating. Queued copies are dropped so it will not alert again.
    ///
    /// Returns true if `id` was the active notification.
    pub fn resolve(&mut self, id: &ReminderId, reason: Resolution) -> bool {
        self.queue.retain(|d| d.id() != id);
        self.missed.retain(|m| m != id);
        if self.active_id() == Some(id) {
            self.resolve_active(reason);
            true
        } else {
            self.timers.cancel_both(id);
            log_reminder_event!(id, "resolved", reason = ?reason, active = false);
            false
        }
    }

    /// Start the pending→missed countdown for a reminder the server already
    /// reports as PENDING. Ignored for ids that are active or queued.
    pub fn track_pending(&mut self, id: &ReminderId) -> bool {
        if self.disposed || self.active_id() == Some(id) || self.queue.iter().any(|d| d.id() == id) {
            return false;
        }
        self.timers.start_pending(id, Command::Timer)
    }

    /// Handle a timer firing posted by the timer bank.
    pub fn on_timer(&mut self, fired: TimerFired) {
        if !self.timers.claim(&fired) {
            return;
        }
        match fired.kind {
            TimerKind::Shown => {
                if self.active_id() == Some(&fired.id) {
                    self.resolve_active(Resolution::ShownTimeout);
                } else {
                    debug!(reminder_id = %fired.id, "shown timer fired for inactive reminder");
                }
            }
            TimerKind::Pending => {
                log_reminder_event!(fired.id, "escalated", status = "MISSED");
                self.send_status(fired.id.clone(), ReminderStatus::Missed);
                self.missed.push_back(fired.id);
                while self.missed.len() > MISSED_HISTORY {
                    self.missed.pop_front();
                }
            }
        }
    }

    /// Activate the next queued reminder once the handoff pause is over.
    pub fn on_handoff(&mut self) {
        if !matches!(self.slot, Slot::Handoff) {
            return;
        }
        self.handoff = None;
        self.slot = Slot::Idle;
        if let Some(next) = self.queue.pop_front() {
            self.activate(next);
        }
    }

    fn begin_handoff(&mut self) {
        if self.queue.is_empty() {
            self.slot = Slot::Idle;
            return;
        }
        self.slot = Slot::Handoff;
        let tx = self.tx.clone();
        let delay = self.handoff_delay;
        self.handoff = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Handoff);
            }
        }));
    }

    /// Fire-and-forget status update. Failures are logged; the follow-up
    /// list refresh reconciles local state with the server either way.
    fn send_status(&self, id: ReminderId, status: ReminderStatus) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let Err(e) = api.update_status(&id, status).await {
                warn!(reminder_id = %id, %status, error = %e, "escalation status update failed");
            }
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Refresh);
            }
        });
    }

    /// Cancel every timer, stop audio, and drop the queue. Further input is
    /// ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(handoff) = self.handoff.take() {
            handoff.abort();
        }
        let cancelled = self.timers.cancel_all();
        self.alert.stop();
        self.queue.clear();
        self.slot = Slot::Idle;
        debug!(cancelled, "sequencer disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn active(&self) -> Option<&ReminderDescriptor> {
        match &self.slot {
            Slot::Active(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    pub fn active_id(&self) -> Option<&ReminderId> {
        self.active().map(ReminderDescriptor::id)
    }

    /// True between resolving one reminder and activating the next.
    pub fn in_handoff(&self) -> bool {
        matches!(self.slot, Slot::Handoff)
    }

    pub fn queued(&self) -> impl Iterator<Item = &ReminderDescriptor> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn escalations(&self) -> Vec<(ReminderId, TimerKind)> {
        self.timers.armed()
    }

    pub fn recently_missed(&self) -> impl Iterator<Item = &ReminderId> {
        self.missed.iter()
    }

    pub fn phase(&self, id: &ReminderId) -> ReminderPhase {
        if self.active_id() == Some(id) {
            ReminderPhase::Active
        } else if self.queue.iter().any(|d| d.id() == id) {
            ReminderPhase::Queued
        } else if self.timers.is_armed(id, TimerKind::Pending) {
            ReminderPhase::PendingEscalation
        } else if self.missed.contains(id) {
            ReminderPhase::Missed
        } else {
            ReminderPhase::Idle
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingApi, RecordingBackend};
    use chrono::Utc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    const HANDOFF: Duration = Duration::from_millis(600);

    struct Harness {
        seq: Sequencer,
        rx: UnboundedReceiver<Command>,
        _tx: UnboundedSender<Command>,
        api: RecordingApi,
        clip: RecordingBackend,
        refreshes: usize,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let api = RecordingApi::new();
            let clip = RecordingBackend::new("clip");
            let alert = AlertPlayer::new(Box::new(clip.clone()), Box::new(RecordingBackend::new("tone")));
            let delays = EscalationDelays {
                shown: Duration::from_secs(20),
                pending: Duration::from_secs(300),
            };
            let seq = Sequencer::new(&tx, delays, HANDOFF, Arc::new(api.clone()), alert);
            Self {
                seq,
                rx,
                _tx: tx,
                api,
                clip,
                refreshes: 0,
            }
        }

        fn ingest(&mut self, id: &str, name: &str) {
            let id = ReminderId::new(id).unwrap();
            self.seq.ingest(ReminderDescriptor::new(id, name, Utc::now()));
        }

        /// Let virtual time pass, routing internal messages as the notifier would.
        async fn run_for(&mut self, total: Duration) {
            let step = Duration::from_millis(100);
            let mut elapsed = Duration::ZERO;
            while elapsed < total {
                tokio::time::sleep(step).await;
                elapsed += step;
                while let Ok(cmd) = self.rx.try_recv() {
                    match cmd {
                        Command::Timer(fired) => self.seq.on_timer(fired),
                        Command::Handoff => self.seq.on_handoff(),
                        Command::Refresh => self.refreshes += 1,
                        _ => {}
                    }
                }
            }
        }

        fn active(&self) -> Option<&str> {
            self.seq.active_id().map(ReminderId::as_str)
        }

        fn queued(&self) -> Vec<&str> {
            self.seq.queued().map(|d| d.id().as_str()).collect()
        }
    }

    fn rid(s: &str) -> ReminderId {
        ReminderId::new(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_taken_then_next_after_handoff() {
        let mut h = Harness::new();

        h.ingest("r1", "Aspirin");
        assert_eq!(h.active(), Some("r1"));
        assert_eq!(h.clip.starts(), 1);

        h.ingest("r2", "Metformin");
        assert_eq!(h.queued(), vec!["r2"]);
        assert_eq!(h.active(), Some("r1"));

        assert!(h.seq.resolve(&rid("r1"), Resolution::Taken));
        assert_eq!(h.active(), None, "next reminder waits for the handoff pause");
        assert!(h.seq.in_handoff());

        h.run_for(HANDOFF + Duration::from_millis(100)).await;
        assert_eq!(h.active(), Some("r2"));
        assert!(h.queued().is_empty());
        assert_eq!(h.clip.starts(), 2);

        h.run_for(Duration::from_secs(1)).await;
        assert!(h.api.statuses_for(&rid("r1")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_active_including_handoff() {
        let mut h = Harness::new();
        for i in 0..5 {
            h.ingest(&format!("r{i}"), "Med");
        }
        assert_eq!(h.active(), Some("r0"));
        assert_eq!(h.seq.queue_len(), 4);

        h.seq.resolve_active(Resolution::Snoozed);
        h.ingest("late", "Med");
        assert_eq!(h.active(), None);
        assert_eq!(h.queued(), vec!["r1", "r2", "r3", "r4", "late"]);

        h.run_for(Duration::from_secs(1)).await;
        assert_eq!(h.active(), Some("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_activation_order() {
        let mut h = Harness::new();
        h.ingest("x", "Med");
        h.ingest("a", "Med");
        h.ingest("b", "Med");
        h.ingest("c", "Med");

        let mut order = Vec::new();
        for _ in 0..3 {
            h.seq.resolve_active(Resolution::Taken);
            h.run_for(Duration::from_secs(1)).await;
            order.push(h.active().unwrap().to_string());
        }
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unattended_reminder_escalates_to_missed() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");

        h.run_for(Duration::from_millis(19_500)).await;
        assert!(h.api.statuses_for(&rid("r1")).is_empty());

        h.run_for(Duration::from_secs(1)).await;
        assert_eq!(h.api.statuses_for(&rid("r1")), vec![ReminderStatus::Pending]);
        assert_eq!(h.active(), None);
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::PendingEscalation);
        assert_eq!(h.seq.escalations(), vec![(rid("r1"), TimerKind::Pending)]);

        h.run_for(Duration::from_secs(301)).await;
        assert_eq!(
            h.api.statuses_for(&rid("r1")),
            vec![ReminderStatus::Pending, ReminderStatus::Missed]
        );
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::Missed);
        assert!(h.seq.escalations().is_empty());
        assert_eq!(h.refreshes, 2, "each escalation call is followed by a refresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_taken_while_active_cancels_escalation() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.run_for(Duration::from_secs(5)).await;

        h.seq.resolve(&rid("r1"), Resolution::Taken);
        assert_eq!(h.clip.halts(), 1);

        h.run_for(Duration::from_secs(400)).await;
        assert!(h.api.statuses_for(&rid("r1")).is_empty());
        assert!(h.seq.escalations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_taken_while_pending_cancels_missed() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.run_for(Duration::from_secs(21)).await;
        assert_eq!(h.api.statuses_for(&rid("r1")), vec![ReminderStatus::Pending]);

        assert!(!h.seq.resolve(&rid("r1"), Resolution::Taken));
        h.run_for(Duration::from_secs(400)).await;
        assert_eq!(h.api.statuses_for(&rid("r1")), vec![ReminderStatus::Pending]);
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_hands_off_to_queued_reminder() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.ingest("r2", "Metformin");

        h.run_for(Duration::from_secs(21)).await;
        assert_eq!(h.active(), Some("r2"));
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::PendingEscalation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_on_queued_reminder_drops_it() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.ingest("r2", "Metformin");
        h.ingest("r2", "Metformin");

        assert!(!h.seq.resolve(&rid("r2"), Resolution::Snoozed));
        assert!(h.queued().is_empty());
        assert_eq!(h.active(), Some("r1"));

        h.seq.resolve_active(Resolution::Taken);
        h.run_for(Duration::from_secs(1)).await;
        assert_eq!(h.active(), None);
        assert!(!h.seq.in_handoff());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_escalation_call_still_clears_timer() {
        let mut h = Harness::new();
        h.api.fail_mutations_for(&rid("r1"));
        h.ingest("r1", "Aspirin");

        h.run_for(Duration::from_secs(21)).await;
        h.run_for(Duration::from_secs(301)).await;
        assert_eq!(
            h.api.statuses_for(&rid("r1")),
            vec![ReminderStatus::Pending, ReminderStatus::Missed]
        );
        assert!(h.seq.escalations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_pending_is_idempotent_and_skips_active() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        assert!(!h.seq.track_pending(&rid("r1")));
        assert!(h.seq.track_pending(&rid("7")));
        assert!(!h.seq.track_pending(&rid("7")));

        h.run_for(Duration::from_secs(301)).await;
        assert_eq!(h.api.count_status(ReminderStatus::Missed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_everything() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.ingest("r2", "Metformin");
        h.seq.track_pending(&rid("9"));

        h.seq.dispose();
        assert_eq!(h.active(), None);
        assert!(h.queued().is_empty());
        assert!(h.seq.escalations().is_empty());
        assert_eq!(h.clip.halts(), 1);

        h.ingest("r3", "Ibuprofen");
        assert_eq!(h.active(), None);

        h.run_for(Duration::from_secs(400)).await;
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_during_pending_escalation_is_ignored() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.run_for(Duration::from_secs(21)).await;
        h.run_for(Duration::from_secs(290)).await;
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::PendingEscalation);

        h.ingest("r1", "Aspirin");
        assert_eq!(h.active(), None);
        assert!(h.queued().is_empty());
        assert_eq!(h.clip.starts(), 1);
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::PendingEscalation);

        h.run_for(Duration::from_secs(30)).await;
        h.run_for(Duration::from_secs(301)).await;
        assert_eq!(
            h.api.statuses_for(&rid("r1")),
            vec![ReminderStatus::Pending, ReminderStatus::Missed]
        );
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::Missed);
        assert!(h.seq.escalations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_copy_restarts_escalation_once() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.ingest("r1", "Aspirin");

        h.run_for(Duration::from_secs(21)).await;
        assert_eq!(h.active(), Some("r1"));
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::Active);
        assert_eq!(h.seq.escalations(), vec![(rid("r1"), TimerKind::Shown)]);

        h.run_for(Duration::from_secs(400)).await;
        assert_eq!(
            h.api.statuses_for(&rid("r1")),
            vec![ReminderStatus::Pending, ReminderStatus::Pending, ReminderStatus::Missed]
        );
        assert_eq!(h.api.count_status(ReminderStatus::Missed), 1);
        assert_eq!(h.seq.phase(&rid("r1")), ReminderPhase::Missed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_during_handoff_on_next_reminder() {
        let mut h = Harness::new();
        h.ingest("r1", "Aspirin");
        h.ingest("r2", "Metformin");
        h.ingest("r3", "Ibuprofen");

        h.seq.resolve_active(Resolution::Taken);
        assert!(h.seq.in_handoff());
        assert!(!h.seq.resolve(&rid("r2"), Resolution::Taken));
        assert_eq!(h.queued(), vec!["r3"]);

        h.run_for(Duration::from_secs(1)).await;
        assert_eq!(h.active(), Some("r3"));
        assert_eq!(h.seq.phase(&rid("r2")), ReminderPhase::Idle);

        h.ingest("r4", "Vitamin D");
        h.seq.resolve_active(Resolution::Snoozed);
        assert!(h.seq.in_handoff());
        assert!(!h.seq.resolve(&rid("r4"), Resolution::Snoozed));
        h.run_for(Duration::from_secs(1)).await;
        assert_eq!(h.active(), None);
        assert!(!h.seq.in_handoff());
        assert_eq!(h.clip.starts(), 2);
        assert!(h.api.calls().is_empty());
    }
}

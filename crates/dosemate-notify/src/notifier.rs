//! Notifier actor and its handle.
//!
//! [`Notifier::spawn`] starts one task that owns the [`Sequencer`] and the
//! [`ReminderBoard`]. Everything that can change them (feed payloads, user
//! actions, timer firings, refresh completions) arrives as a [`Command`] on
//! a single channel, so the task processes them one at a time. Observers read
//! state through a `watch` channel of [`NotifierSnapshot`].
//!
//! Internal tasks (timers, status updates, fetches) hold only weak senders:
//! once every [`NotifierHandle`] is dropped the channel closes and the actor
//! disposes itself.

use std::sync::Arc;

use chrono::Utc;
use dosemate_core::{ReminderId, ReminderStatus, ReminderSummary};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alert::AlertPlayer;
use crate::api::ReminderApi;
use crate::board::ReminderBoard;
use crate::config::NotifierConfig;
use crate::error::{NotifyError, Result};
use crate::ingest::{normalize, normalize_text, ReminderDescriptor};
use crate::sequencer::{Resolution, Sequencer};
use crate::timers::{EscalationDelays, TimerFired, TimerKind};

/// Shown to the user when marking a dose taken fails.
pub const TAKEN_FAILED: &str = "Failed to mark taken";
/// Shown to the user when a snooze fails.
pub const SNOOZE_FAILED: &str = "Failed to snooze reminder";

/// Messages processed by the notifier task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Raw text frame from the feed
    Event(String),
    /// Already-parsed feed payload
    EventValue(Value),
    /// Patient acted on a reminder
    UserAction { id: ReminderId, resolution: Resolution },
    /// An escalation timer elapsed
    Timer(TimerFired),
    /// Handoff pause ended
    Handoff,
    /// Re-fetch the reminder lists
    Refresh,
    /// Reminder lists fetched (or not)
    Refreshed(Result<(Vec<ReminderSummary>, Vec<ReminderSummary>)>),
    /// A user action failed on the server
    ActionFailed(&'static str),
    /// Tear everything down and stop
    Dispose,
}

/// Point-in-time view of the notifier state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierSnapshot {
    pub active: Option<ReminderDescriptor>,
    pub queued: Vec<ReminderDescriptor>,
    pub escalating: Vec<(ReminderId, TimerKind)>,
    pub missed: Vec<ReminderId>,
    pub pending: Vec<ReminderSummary>,
    pub upcoming: Vec<ReminderSummary>,
    pub loading: bool,
    pub last_error: Option<String>,
    pub disposed: bool,
}

impl NotifierSnapshot {
    pub fn active_id(&self) -> Option<&ReminderId> {
        self.active.as_ref().map(ReminderDescriptor::id)
    }

    pub fn queued_ids(&self) -> Vec<&ReminderId> {
        self.queued.iter().map(ReminderDescriptor::id).collect()
    }
}

struct NotifierTask {
    sequencer: Sequencer,
    board: ReminderBoard,
    api: Arc<dyn ReminderApi>,
    tx: WeakUnboundedSender<Command>,
    state: watch::Sender<NotifierSnapshot>,
}

impl NotifierTask {
    async fn run(mut self, mut rx: UnboundedReceiver<Command>) {
        debug!("notifier started");
        while let Some(command) = rx.recv().await {
            let stop = matches!(command, Command::Dispose);
            self.handle(command);
            self.publish();
            if stop {
                break;
            }
        }
        self.sequencer.dispose();
        self.publish();
        info!("notifier stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Event(raw) => {
                if let Some(descriptor) = normalize_text(&raw, Utc::now()) {
                    self.sequencer.ingest(descriptor);
                }
                self.refresh();
            }
            Command::EventValue(payload) => {
                match normalize(&payload, Utc::now()) {
                    Some(descriptor) => self.sequencer.ingest(descriptor),
                    None => debug!("reminder event without id dropped"),
                }
                self.refresh();
            }
            Command::UserAction { id, resolution } => {
                self.board.clear_error();
                self.sequencer.resolve(&id, resolution);
                self.board.remove_pending(&id);
            }
            Command::Timer(fired) => self.sequencer.on_timer(fired),
            Command::Handoff => self.sequencer.on_handoff(),
            Command::Refresh => self.refresh(),
            Command::Refreshed(result) => {
                let outcome = self.board.apply(result);
                if outcome.first_load {
                    for id in self.board.due_pending_ids(Utc::now()) {
                        self.sequencer.track_pending(&id);
                    }
                }
                if outcome.rerun {
                    self.refresh();
                }
            }
            Command::ActionFailed(message) => self.board.set_error(message),
            Command::Dispose => {}
        }
    }

    fn refresh(&mut self) {
        if self.sequencer.is_disposed() || !self.board.request_refresh() {
            return;
        }
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let (pending, upcoming) = tokio::join!(api.pending(), api.upcoming());
            let result = pending.and_then(|p| upcoming.map(|u| (p, u)));
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Refreshed(result));
            }
        });
    }

    fn publish(&self) {
        let seq = &self.sequencer;
        self.state.send_replace(NotifierSnapshot {
            active: seq.active().cloned(),
            queued: seq.queued().cloned().collect(),
            escalating: seq.escalations(),
            missed: seq.recently_missed().cloned().collect(),
            pending: self.board.pending().to_vec(),
            upcoming: self.board.upcoming().to_vec(),
            loading: self.board.is_loading(),
            last_error: self.board.last_error().map(str::to_string),
            disposed: seq.is_disposed(),
        });
    }
}

/// Cloneable front door to a running notifier.
#[derive(Clone)]
pub struct NotifierHandle {
    tx: UnboundedSender<Command>,
    state: watch::Receiver<NotifierSnapshot>,
    api: Arc<dyn ReminderApi>,
    default_snooze_minutes: u32,
}

impl NotifierHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| NotifyError::NotifierClosed)
    }

    /// Feed a raw text frame from the event stream.
    pub fn ingest_raw(&self, raw: impl Into<String>) -> Result<()> {
        self.send(Command::Event(raw.into()))
    }

    /// Feed an already-decoded event payload.
    pub fn ingest_value(&self, payload: Value) -> Result<()> {
        self.send(Command::EventValue(payload))
    }

    /// Mark `id` taken: clear it locally, then tell the server.
    ///
    /// On failure the lists are re-fetched (restoring the row) and the
    /// error message is recorded in the snapshot before the error is returned.
    pub async fn mark_taken(&self, id: &ReminderId) -> Result<()> {
        self.send(Command::UserAction {
            id: id.clone(),
            resolution: Resolution::Taken,
        })?;
        let result = self.api.update_status(id, ReminderStatus::Taken).await;
        self.after_action(id, result, TAKEN_FAILED)
    }

    /// Snooze `id` for `minutes`, or the configured default when `None` or 0.
    pub async fn snooze(&self, id: &ReminderId, minutes: Option<u32>) -> Result<()> {
        let minutes = minutes.filter(|m| *m > 0).unwrap_or(self.default_snooze_minutes);
        self.send(Command::UserAction {
            id: id.clone(),
            resolution: Resolution::Snoozed,
        })?;
        let result = self.api.snooze(id, minutes).await;
        self.after_action(id, result, SNOOZE_FAILED)
    }

    fn after_action(&self, id: &ReminderId, result: Result<()>, failure: &'static str) -> Result<()> {
        if let Err(e) = &result {
            warn!(reminder_id = %id, error = %e, "{}", failure);
            let _ = self.send(Command::ActionFailed(failure));
        }
        let _ = self.send(Command::Refresh);
        result
    }

    /// Re-fetch the pending and upcoming lists.
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Current state.
    pub fn snapshot(&self) -> NotifierSnapshot {
        self.state.borrow().clone()
    }

    /// Watch for state changes.
    pub fn subscribe(&self) -> watch::Receiver<NotifierSnapshot> {
        self.state.clone()
    }

    /// Ask the notifier to cancel everything and stop. Idempotent.
    pub fn dispose(&self) {
        let _ = self.tx.send(Command::Dispose);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the notifier task has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// A running notifier: its handle plus the task driving it.
pub struct Notifier {
    handle: NotifierHandle,
    task: JoinHandle<()>,
}

impl Notifier {
    /// Start the notifier task. Does not fetch anything until asked to.
    pub fn spawn(config: &NotifierConfig, api: Arc<dyn ReminderApi>, alert: AlertPlayer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(NotifierSnapshot::default());
        let delays = EscalationDelays {
            shown: config.shown_timeout(),
            pending: config.pending_timeout(),
        };
        let sequencer = Sequencer::new(&tx, delays, config.handoff_delay(), Arc::clone(&api), alert);
        let task = NotifierTask {
            sequencer,
            board: ReminderBoard::new(),
            api: Arc::clone(&api),
            tx: tx.downgrade(),
            state: state_tx,
        };
        let task = tokio::spawn(task.run(rx));

        Self {
            handle: NotifierHandle {
                tx,
                state: state_rx,
                api,
                default_snooze_minutes: config.default_snooze_minutes,
            },
            task,
        }
    }

    pub fn handle(&self) -> NotifierHandle {
        self.handle.clone()
    }

    /// Dispose and wait for the task to finish.
    pub async fn dispose(self) {
        self.handle.dispose();
        if let Err(e) = self.task.await {
            warn!(error = %e, "notifier task ended abnormally");
        }
    }
}

//! Escalation timer bank.
//!
//! Each reminder id can have at most one armed timer of each [`TimerKind`].
//! A timer is a sleeping tokio task that, when it wakes, posts a message built
//! from a [`TimerFired`] back to the owner's channel. The owner must call
//! [`TimerBank::claim`] before acting on a firing: a timer cancelled after its
//! task already posted carries a stale ticket and is rejected there.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use dosemate_core::ReminderId;
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

/// Which escalation step a timer guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// On screen, waiting to be marked PENDING
    Shown,
    /// PENDING on the server, waiting to be marked MISSED
    Pending,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shown => write!(f, "shown"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// Notice that a timer's delay elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub id: ReminderId,
    pub kind: TimerKind,
    ticket: u64,
}

/// Delays for the two escalation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationDelays {
    pub shown: Duration,
    pub pending: Duration,
}

impl EscalationDelays {
    pub fn for_kind(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::Shown => self.shown,
            TimerKind::Pending => self.pending,
        }
    }
}

struct Armed {
    ticket: u64,
    handle: JoinHandle<()>,
}

/// Per-reminder escalation timers.
pub struct TimerBank<M: Send + 'static> {
    tx: WeakUnboundedSender<M>,
    delays: EscalationDelays,
    armed: HashMap<(ReminderId, TimerKind), Armed>,
    next_ticket: u64,
}

impl<M: Send + 'static> TimerBank<M> {
    /// Create a bank that posts firings to `tx`.
    ///
    /// Only a weak reference to the channel is kept, so armed timers never
    /// keep the owner's channel open.
    pub fn new(tx: &UnboundedSender<M>, delays: EscalationDelays) -> Self {
        Self {
            tx: tx.downgrade(),
            delays,
            armed: HashMap::new(),
            next_ticket: 1,
        }
    }

    /// Arm the shown→pending timer for `id`. No-op if already armed.
    pub fn start_shown<F>(&mut self, id: &ReminderId, on_fire: F) -> bool
    where
        F: FnOnce(TimerFired) -> M + Send + 'static,
    {
        self.start(id, TimerKind::Shown, on_fire)
    }

    /// Arm the pending→missed timer for `id`. No-op if already armed.
    pub fn start_pending<F>(&mut self, id: &ReminderId, on_fire: F) -> bool
    where
        F: FnOnce(TimerFired) -> M + Send + 'static,
    {
        self.start(id, TimerKind::Pending, on_fire)
    }

    /// Arm a timer. Returns false (and changes nothing) if one of the same
    /// kind is already armed for `id`.
    pub fn start<F>(&mut self, id: &ReminderId, kind: TimerKind, on_fire: F) -> bool
    where
        F: FnOnce(TimerFired) -> M + Send + 'static,
    {
        let key = (id.clone(), kind);
        if self.armed.contains_key(&key) {
            debug!(reminder_id = %id, %kind, "timer already armed");
            return false;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let delay = self.delays.for_kind(kind);
        let tx = self.tx.clone();
        let fired = TimerFired {
            id: id.clone(),
            kind,
            ticket,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(on_fire(fired));
            }
        });

        debug!(reminder_id = %id, %kind, delay_ms = delay.as_millis() as u64, "timer armed");
        self.armed.insert(key, Armed { ticket, handle });
        true
    }

    /// Disarm a timer. Safe to call when none is armed.
    pub fn cancel(&mut self, id: &ReminderId, kind: TimerKind) -> bool {
        match self.armed.remove(&(id.clone(), kind)) {
            Some(armed) => {
                armed.handle.abort();
                debug!(reminder_id = %id, %kind, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Disarm both timers for `id`.
    pub fn cancel_both(&mut self, id: &ReminderId) {
        self.cancel(id, TimerKind::Shown);
        self.cancel(id, TimerKind::Pending);
    }

    /// Disarm every timer. Returns how many were armed.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.armed.len();
        for (_, armed) in self.armed.drain() {
            armed.handle.abort();
        }
        count
    }

    /// Accept a firing if it belongs to the currently armed timer, removing
    /// that timer from the bank.
    pub fn claim(&mut self, fired: &TimerFired) -> bool {
        let key = (fired.id.clone(), fired.kind);
        match self.armed.get(&key) {
            Some(armed) if armed.ticket == fired.ticket => {
                self.armed.remove(&key);
                true
            }
            _ => {
                debug!(reminder_id = %fired.id, kind = %fired.kind, "stale timer firing ignored");
                false
            }
        }
    }

    pub fn is_armed(&self, id: &ReminderId, kind: TimerKind) -> bool {
        self.armed.contains_key(&(id.clone(), kind))
    }

    /// Armed timers, sorted by id then kind.
    pub fn armed(&self) -> Vec<(ReminderId, TimerKind)> {
        let mut keys: Vec<_> = self.armed.keys().cloned().collect();
        keys.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| (a.1 == TimerKind::Pending).cmp(&(b.1 == TimerKind::Pending)))
        });
        keys
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl<M: Send + 'static> Drop for TimerBank<M> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

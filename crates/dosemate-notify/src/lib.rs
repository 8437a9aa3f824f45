//! # dosemate-notify
//!
//! Client-side reminder notifications for DoseMate.
//!
//! This crate provides:
//! - [`Notifier`] / [`NotifierHandle`] - Actor owning all notification state
//! - [`Sequencer`] - One active notification at a time, FIFO queue behind it
//! - [`TimerBank`] - Shown→pending and pending→missed escalation timers
//! - [`AlertPlayer`] - Audible cue with a synthesized-tone fallback
//! - [`HttpReminderApi`] - REST client for status updates and list refresh
//! - [`run_feed`] - WebSocket reminder stream with reconnect
//!
//! ## Escalation
//!
//! A reminder that arrives while nothing is on screen becomes active, plays
//! the alert, and starts a shown timer (20s by default). If the patient does
//! nothing it is marked PENDING on the server and a pending timer starts
//! (5 min); when that elapses too it is marked MISSED. Taking or snoozing the
//! reminder cancels whichever timer is running.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dosemate_notify::{AlertPlayer, HttpReminderApi, Notifier, NotifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> dosemate_notify::Result<()> {
//!     let config = NotifierConfig::load(None)?;
//!     let api = Arc::new(HttpReminderApi::from_config(&config)?);
//!     let notifier = Notifier::spawn(&config, api, AlertPlayer::from_config(&config.alert));
//!
//!     let handle = notifier.handle();
//!     handle.ingest_raw(r#"{"id": 7, "medicineName": "Aspirin"}"#)?;
//!     println!("{:?}", handle.snapshot().active_id());
//!
//!     notifier.dispose().await;
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod api;
pub mod board;
pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod notifier;
pub mod sequencer;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod timers;

pub use alert::{AlertBackend, AlertPlayer, SilentBackend};
pub use api::{HttpReminderApi, ReminderApi};
pub use board::ReminderBoard;
pub use config::{AlertConfig, NotifierConfig};
pub use error::{NotifyError, Result};
pub use feed::{run_feed, ReminderFeed};
pub use ingest::{normalize, normalize_text, ReminderDescriptor};
pub use notifier::{Notifier, NotifierHandle, NotifierSnapshot};
pub use sequencer::{ReminderPhase, Resolution, Sequencer};
pub use timers::{EscalationDelays, TimerBank, TimerFired, TimerKind};

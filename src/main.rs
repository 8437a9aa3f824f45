//! DoseMate - medicine reminder notifier
//!
//! Listens to the reminder feed, surfaces one reminder at a time with an
//! audible alert, and escalates unattended reminders to PENDING and then
//! MISSED on the server.
//!
//! ## Usage
//!
//! ```bash
//! # Run against the default backend
//! dosemate
//!
//! # With verbose logging and a different backend
//! dosemate -v --api-base https://dosemate.example/api --feed-url wss://dosemate.example/ws/reminders
//! ```
//!
//! While running, stdin accepts:
//!
//! ```text
//! taken <id>            mark a reminder taken
//! snooze <id> [min]     snooze a reminder (default from config)
//! refresh               re-fetch pending and upcoming lists
//! status                print the current state
//! quit                  shut down
//! {"id": ...}           inject a raw reminder event
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dosemate_core::{init_logging, LogGuard, ReminderId};
use dosemate_notify::{
    run_feed, AlertPlayer, HttpReminderApi, Notifier, NotifierConfig, NotifierHandle, NotifierSnapshot,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info};

/// DoseMate reminder notifier
#[derive(Parser, Debug)]
#[command(name = "dosemate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.dosemate/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.dosemate/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the REST API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Override the reminder feed URL
    #[arg(long)]
    feed_url: Option<String>,
}

/// One line of operator input.
#[derive(Debug, PartialEq)]
enum Input {
    Taken(ReminderId),
    Snooze(ReminderId, Option<u32>),
    Refresh,
    Status,
    Quit,
    Event(String),
}

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.starts_with('{') {
        return Ok(Input::Event(line.to_string()));
    }
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let id = |word: Option<&str>| {
        word.and_then(ReminderId::new)
            .ok_or_else(|| format!("usage: {} <id>", command))
    };
    match command {
        "taken" => Ok(Input::Taken(id(words.next())?)),
        "snooze" => {
            let reminder = id(words.next())?;
            let minutes = match words.next() {
                Some(m) => Some(m.parse().map_err(|_| format!("invalid minutes: {}", m))?),
                None => None,
            };
            Ok(Input::Snooze(reminder, minutes))
        }
        "refresh" => Ok(Input::Refresh),
        "status" => Ok(Input::Status),
        "quit" | "exit" => Ok(Input::Quit),
        other => Err(format!("unknown command: {}", other)),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    info!("Starting DoseMate notifier");

    match runtime.block_on(run(cli)) {
        Ok(()) => {
            info!("DoseMate notifier exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("DoseMate notifier error: {}", e);
            eprintln!("Error: {}", e.friendly_message());
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> dosemate_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn load_config(cli: &Cli) -> dosemate_notify::Result<NotifierConfig> {
    let mut config = NotifierConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.api_base {
        config = config.with_api_base_url(url);
    }
    if let Some(url) = &cli.feed_url {
        config = config.with_feed_url(url);
    }
    Ok(config)
}

async fn run(cli: Cli) -> dosemate_notify::Result<()> {
    let config = load_config(&cli)?;
    let api = Arc::new(HttpReminderApi::from_config(&config)?);
    let notifier = Notifier::spawn(&config, api, AlertPlayer::from_config(&config.alert));
    let handle = notifier.handle();

    tokio::spawn(run_feed(config.feed_url.clone(), handle.clone(), config.reconnect_delay()));
    tokio::spawn(print_changes(handle.subscribe()));
    handle.refresh()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Ok(Input::Quit) => break,
                    Ok(input) => execute(&handle, input).await,
                    Err(message) => eprintln!("{}", message),
                }
            }
        }
    }

    notifier.dispose().await;
    Ok(())
}

async fn execute(handle: &NotifierHandle, input: Input) {
    let result = match input {
        Input::Taken(id) => handle.mark_taken(&id).await,
        Input::Snooze(id, minutes) => handle.snooze(&id, minutes).await,
        Input::Refresh => handle.refresh(),
        Input::Event(raw) => handle.ingest_raw(raw),
        Input::Status => {
            print_status(&handle.snapshot());
            Ok(())
        }
        Input::Quit => Ok(()),
    };
    if let Err(e) = result {
        eprintln!("{}", e.friendly_message());
    }
}

/// Print a line whenever the active reminder or queue changes.
async fn print_changes(mut state: watch::Receiver<NotifierSnapshot>) {
    let mut last = (None, 0);
    while state.changed().await.is_ok() {
        let snapshot = state.borrow_and_update().clone();
        let current = (snapshot.active_id().cloned(), snapshot.queued.len());
        if current != last {
            match &snapshot.active {
                Some(active) => println!(
                    "[{}] {} ({} queued)",
                    active.id(),
                    active.body(),
                    snapshot.queued.len()
                ),
                None if !snapshot.disposed => println!("no active reminder"),
                None => {}
            }
            last = current;
        }
    }
}

fn print_status(snapshot: &NotifierSnapshot) {
    match &snapshot.active {
        Some(active) => println!("active:    {} {}", active.id(), active.medicine_name()),
        None => println!("active:    -"),
    }
    let queued: Vec<String> = snapshot.queued_ids().iter().map(|id| id.to_string()).collect();
    println!("queued:    [{}]", queued.join(", "));
    for (id, kind) in &snapshot.escalating {
        println!("timer:     {} ({})", id, kind);
    }
    if !snapshot.missed.is_empty() {
        let missed: Vec<String> = snapshot.missed.iter().map(ToString::to_string).collect();
        println!("missed:    [{}]", missed.join(", "));
    }
    println!("pending:   {}", snapshot.pending.len());
    println!("upcoming:  {}", snapshot.upcoming.len());
    if let Some(e) = &snapshot.last_error {
        println!("error:     {}", e);
    }
}

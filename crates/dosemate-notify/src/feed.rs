//! WebSocket reminder feed.
//!
//! The backend pushes one JSON reminder event per text frame. [`run_feed`]
//! forwards each frame to a [`NotifierHandle`] and reconnects after a fixed
//! delay whenever the socket drops, until the notifier shuts down.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{NotifyError, Result};
use crate::notifier::NotifierHandle;

fn feed_err(e: impl std::fmt::Display) -> NotifyError {
    NotifyError::FeedConnection(e.to_string())
}

/// An open connection to the reminder event stream.
pub struct ReminderFeed {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ReminderFeed {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, response) = connect_async(url).await.map_err(feed_err)?;
        debug!(status = %response.status(), "feed handshake complete");
        Ok(Self { stream })
    }

    /// Next text frame, or `None` once the server closes the stream.
    /// Binary frames are skipped; ping/pong is handled by the socket.
    pub async fn next_text(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message.map_err(feed_err)? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(frame) => {
                    debug!(?frame, "feed closed by server");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

async fn pump(url: &str, handle: &NotifierHandle) -> Result<()> {
    let mut feed = ReminderFeed::connect(url).await?;
    info!(url, "reminder feed connected");
    while let Some(text) = feed.next_text().await? {
        handle.ingest_raw(text)?;
    }
    Ok(())
}

/// Forward feed frames to `handle` until the notifier closes.
pub async fn run_feed(url: String, handle: NotifierHandle, reconnect_delay: Duration) {
    loop {
        tokio::select! {
            _ = handle.closed() => break,
            outcome = pump(&url, &handle) => match outcome {
                Ok(()) => info!("reminder feed disconnected"),
                Err(NotifyError::NotifierClosed) => break,
                Err(e) => warn!(error = %e, retry_in_secs = reconnect_delay.as_secs(), "reminder feed error"),
            },
        }
        tokio::select! {
            _ = handle.closed() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    debug!("reminder feed stopped");
}

//! Log source and publisher seam.
//!
//! Stage executors publish [`LogEvent`]s through a [`LogPublisher`]; the
//! aggregator drains a [`LogSource`]. Both ends of the in-process channel
//! are provided by [`log_channel`]. Executors running in a different
//! process publish over HTTP with [`HttpLogPublisher`], which feeds the
//! store daemon's ingest endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use forgeline_state::LogEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Path of the log ingest endpoint on the store daemon.
pub const LOG_EVENTS_PATH: &str = "/api/v1/log-events";

/// Largest array posted by [`HttpLogPublisher`] in one request.
const MAX_EVENTS_PER_POST: usize = 64;

/// Upstream the aggregator drains.
#[async_trait]
pub trait LogSource: Send {
    /// Next event, or `None` once every producer is gone.
    async fn recv(&mut self) -> Option<LogEvent>;
}

#[async_trait]
impl LogSource for mpsc::UnboundedReceiver<LogEvent> {
    async fn recv(&mut self) -> Option<LogEvent> {
        mpsc::UnboundedReceiver::recv(self).await
    }
}

/// Non-blocking sink for stage output lines.
pub trait LogPublisher: Send + Sync {
    fn publish(&self, event: LogEvent);
}

/// Publisher side of the in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::UnboundedSender<LogEvent>) -> Self {
        Self { tx }
    }
}

impl LogPublisher for ChannelPublisher {
    fn publish(&self, event: LogEvent) {
        if self.tx.send(event).is_err() {
            warn!("log channel closed, dropping event");
        }
    }
}

/// Create a connected publisher/source pair.
pub fn log_channel() -> (ChannelPublisher, mpsc::UnboundedReceiver<LogEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelPublisher::new(tx), rx)
}

/// Publisher that forwards events to a remote ingest endpoint.
///
/// `publish` only enqueues. A single background task posts the queue in
/// order, so events from one stage arrive in the order they were produced.
#[derive(Debug, Clone)]
pub struct HttpLogPublisher {
    inner: ChannelPublisher,
}

impl HttpLogPublisher {
    /// Spawn the forwarding task. Must be called inside a tokio runtime.
    pub fn spawn(base_url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = request_timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().context("building log publisher HTTP client")?;
        let url = format!("{}{}", base_url.trim_end_matches('/'), LOG_EVENTS_PATH);

        let (inner, rx) = log_channel();
        tokio::spawn(forward(client, url, rx));
        Ok(Self { inner })
    }
}

impl LogPublisher for HttpLogPublisher {
    fn publish(&self, event: LogEvent) {
        self.inner.publish(event);
    }
}

async fn forward(client: reqwest::Client, url: String, mut rx: mpsc::UnboundedReceiver<LogEvent>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < MAX_EVENTS_PER_POST {
            match rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }

        if let Err(e) = post_batch(&client, &url, &batch).await {
            // delivery is best-effort, as with any log line
            warn!(url = %url, count = batch.len(), error = %e, "log forwarding failed");
        } else {
            debug!(count = batch.len(), "forwarded log events");
        }
    }
}

async fn post_batch(client: &reqwest::Client, url: &str, batch: &[LogEvent]) -> Result<()> {
    client
        .post(url)
        .json(batch)
        .send()
        .await
        .context("sending log events")?
        .error_for_status()
        .context("log ingest endpoint rejected events")?;
    Ok(())
}

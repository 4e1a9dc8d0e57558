//! Batched ingestion of stage log lines into a [`LogStore`].
//!
//! Events are appended to an in-memory buffer and written in bulk once the
//! buffer holds `batch_size` events, or once the oldest buffered event has
//! waited `batch_timeout`. The trigger is checked after every ingest and on
//! every idle poll of [`LogAggregator::run`].
//!
//! The buffer mutex is held only to append/check and to snapshot-and-clear;
//! the store write happens outside it. A second (async) lock serialises
//! flushes so batches reach the store in ingestion order.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use forgeline_state::{LogEvent, LogStore};
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

use crate::metrics::METRICS;
use crate::obs;
use crate::source::LogSource;

const DEFAULT_BATCH_SIZE: usize = 15;
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BUFFERED: usize = 10_000;

/// Aggregator tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Flush as soon as this many events are buffered.
    pub batch_size: usize,
    /// Flush once the oldest buffered event is this old.
    pub batch_timeout: Duration,
    /// How long `run` waits for an event before re-checking the timeout.
    pub poll_interval: Duration,
    /// Retention cap applied when a failed batch is put back.
    pub max_buffered: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }
}

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No trigger held, or nothing was buffered.
    Idle,
    /// This many events were written.
    Flushed(usize),
    /// The write failed; this many events are buffered again.
    Failed { retained: usize },
}

#[derive(Debug, Default)]
struct Buffer {
    events: Vec<LogEvent>,
    first_event_at: Option<Instant>,
}

/// Owned log buffer shared (via `Arc`) between producers and its drain task.
pub struct LogAggregator {
    store: Arc<dyn LogStore>,
    config: AggregatorConfig,
    buffer: Mutex<Buffer>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl LogAggregator {
    pub fn new(store: Arc<dyn LogStore>, config: AggregatorConfig) -> Self {
        Self {
            store,
            config,
            buffer: Mutex::new(Buffer::default()),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Number of events currently waiting for a flush.
    pub fn buffered(&self) -> usize {
        self.lock_buffer().events.len()
    }

    /// Append one event and flush if a trigger now holds.
    pub async fn ingest(&self, event: LogEvent) -> FlushOutcome {
        self.push(event);
        self.flush_if_due().await
    }

    /// Append one event without checking the triggers.
    pub fn push(&self, event: LogEvent) {
        let mut buf = self.lock_buffer();
        buf.events.push(event);
        if buf.first_event_at.is_none() {
            buf.first_event_at = Some(Instant::now());
        }
        METRICS.inc_log_events_ingested();
    }

    /// Flush when the buffer is full or its oldest event timed out.
    pub async fn flush_if_due(&self) -> FlushOutcome {
        if self.is_due(Instant::now()) {
            self.flush().await
        } else {
            FlushOutcome::Idle
        }
    }

    /// Write everything buffered, regardless of the triggers.
    pub async fn flush(&self) -> FlushOutcome {
        let _serial = self.flush_lock.lock().await;

        let batch = {
            let mut buf = self.lock_buffer();
            buf.first_event_at = None;
            std::mem::take(&mut buf.events)
        };
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        let started = Instant::now();
        match self.store.insert_batch(&batch).await {
            Ok(()) => {
                METRICS.inc_log_batches_flushed();
                obs::emit_logs_flushed(batch.len(), started.elapsed().as_millis() as u64);
                FlushOutcome::Flushed(batch.len())
            }
            Err(e) => {
                METRICS.inc_log_flush_failures();
                obs::emit_logs_flush_failed(batch.len(), &e);
                let retained = self.restore(batch);
                FlushOutcome::Failed { retained }
            }
        }
    }

    /// Drain `source` until it closes, flushing on size and on timeout.
    ///
    /// The receive timeout doubles as the idle poll. When the source closes
    /// the remaining events are flushed once before returning.
    pub async fn run<S: LogSource>(&self, mut source: S) {
        info!(
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout.as_millis() as u64,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "log aggregator started"
        );

        loop {
            match timeout(self.config.poll_interval, source.recv()).await {
                Ok(Some(event)) => {
                    self.ingest(event).await;
                }
                Ok(None) => {
                    debug!(buffered = self.buffered(), "log source closed, final flush");
                    self.flush().await;
                    break;
                }
                Err(_) => {
                    self.flush_if_due().await;
                }
            }
        }

        info!("log aggregator stopped");
    }

    fn is_due(&self, now: Instant) -> bool {
        let buf = self.lock_buffer();
        if buf.events.is_empty() {
            return false;
        }
        if buf.events.len() >= self.config.batch_size {
            return true;
        }
        buf.first_event_at
            .is_some_and(|first| now.duration_since(first) >= self.config.batch_timeout)
    }

    /// Put a failed batch back in front of anything ingested meanwhile and
    /// apply the retention cap. Returns the new buffer length.
    fn restore(&self, mut batch: Vec<LogEvent>) -> usize {
        let mut buf = self.lock_buffer();
        batch.append(&mut buf.events);
        buf.events = batch;
        // retry after another full timeout window
        buf.first_event_at = Some(Instant::now());

        let excess = buf.events.len().saturating_sub(self.config.max_buffered);
        if excess > 0 {
            buf.events.drain(..excess);
            METRICS.add_log_events_dropped(excess as u64);
            obs::emit_logs_dropped(excess, self.config.max_buffered);
        }
        buf.events.len()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Buffer> {
        // a poisoned buffer still holds valid events
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Global atomic counters for Forgeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on a daemon tick or at shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    runs_triggered: AtomicU64,
    stages_executed: AtomicU64,
    log_events_ingested: AtomicU64,
    log_batches_flushed: AtomicU64,
    log_flush_failures: AtomicU64,
    log_events_dropped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_triggered: AtomicU64::new(0),
            stages_executed: AtomicU64::new(0),
            log_events_ingested: AtomicU64::new(0),
            log_batches_flushed: AtomicU64::new(0),
            log_flush_failures: AtomicU64::new(0),
            log_events_dropped: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_triggered(&self) {
        self.runs_triggered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_triggered", "counter incremented");
    }

    pub fn inc_stages_executed(&self) {
        self.stages_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stages_executed", "counter incremented");
    }

    pub fn inc_log_events_ingested(&self) {
        self.log_events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_log_batches_flushed(&self) {
        self.log_batches_flushed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "log_batches_flushed", "counter incremented");
    }

    pub fn inc_log_flush_failures(&self) {
        self.log_flush_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "log_flush_failures", "counter incremented");
    }

    /// Add `n` events discarded by the aggregator's retention cap.
    pub fn add_log_events_dropped(&self, n: u64) {
        self.log_events_dropped.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "log_events_dropped", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_triggered = self.runs_triggered(),
            stages_executed = self.stages_executed(),
            log_events_ingested = self.log_events_ingested(),
            log_batches_flushed = self.log_batches_flushed(),
            log_flush_failures = self.log_flush_failures(),
            log_events_dropped = self.log_events_dropped(),
        );
    }

    pub fn runs_triggered(&self) -> u64 {
        self.runs_triggered.load(Ordering::Relaxed)
    }

    pub fn stages_executed(&self) -> u64 {
        self.stages_executed.load(Ordering::Relaxed)
    }

    pub fn log_events_ingested(&self) -> u64 {
        self.log_events_ingested.load(Ordering::Relaxed)
    }

    pub fn log_batches_flushed(&self) -> u64 {
        self.log_batches_flushed.load(Ordering::Relaxed)
    }

    pub fn log_flush_failures(&self) -> u64 {
        self.log_flush_failures.load(Ordering::Relaxed)
    }

    pub fn log_events_dropped(&self) -> u64 {
        self.log_events_dropped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_triggered.store(0, Ordering::Relaxed);
        self.stages_executed.store(0, Ordering::Relaxed);
        self.log_events_ingested.store(0, Ordering::Relaxed);
        self.log_batches_flushed.store(0, Ordering::Relaxed);
        self.log_flush_failures.store(0, Ordering::Relaxed);
        self.log_events_dropped.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let m = Metrics::new();
        m.inc_runs_triggered();
        m.inc_stages_executed();
        m.inc_stages_executed();
        m.add_log_events_dropped(7);
        m.add_log_events_dropped(3);

        assert_eq!(m.runs_triggered(), 1);
        assert_eq!(m.stages_executed(), 2);
        assert_eq!(m.log_events_dropped(), 10);
        assert_eq!(m.log_batches_flushed(), 0);
    }

    #[test]
    fn test_reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_log_events_ingested();
        m.inc_log_batches_flushed();
        m.inc_log_flush_failures();
        m.reset();
        assert_eq!(m.log_events_ingested(), 0);
        assert_eq!(m.log_batches_flushed(), 0);
        assert_eq!(m.log_flush_failures(), 0);
    }
}

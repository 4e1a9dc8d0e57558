//! Forgeline Core Library
//!
//! Log aggregation and the ambient observability stack shared by every
//! Forgeline role: tracing setup, structured lifecycle events and counters.

pub mod aggregator;
pub mod metrics;
pub mod obs;
pub mod source;
pub mod telemetry;

pub use aggregator::{AggregatorConfig, FlushOutcome, LogAggregator};
pub use metrics::{Metrics, METRICS};
pub use obs::{
    action_span, emit_action_rejected, emit_action_triggered, emit_logs_dropped,
    emit_logs_flush_failed, emit_logs_flushed, emit_stage_call_failed, emit_stage_finished,
    emit_stage_started, emit_status_report_failed,
};
pub use source::{
    log_channel, ChannelPublisher, HttpLogPublisher, LogPublisher, LogSource, LOG_EVENTS_PATH,
};
pub use telemetry::init_tracing;

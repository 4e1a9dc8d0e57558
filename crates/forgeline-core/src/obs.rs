//! Structured observability hooks for pipeline and log lifecycle events.
//!
//! This module provides:
//! - Action-scoped tracing spans via [`action_span`]
//! - Emission functions for key lifecycle events: trigger, stage start and
//!   finish, log flushes and drops
//!
//! Every event carries an `event = "..."` field so JSON output can be
//! filtered without parsing messages.

use tracing::{error, info, warn};

/// Action-scoped span, meant to be attached with `Instrument` so every
/// event of a run (including across `.await` points) carries the uid.
///
/// # Example
///
/// ```ignore
/// run_stages(...).instrument(action_span("3f0c...")).await;
/// ```
pub fn action_span(action_uid: &str) -> tracing::Span {
    tracing::info_span!("forgeline.action", action_uid = %action_uid)
}

/// Emit event: a run was accepted and recorded.
pub fn emit_action_triggered(action_uid: &str, repo_name: &str, action_type: &str, user: &str) {
    info!(
        event = "action.triggered",
        action_uid = %action_uid,
        repo_name = %repo_name,
        action_type = %action_type,
        user = %user,
    );
}

/// Emit event: a trigger was rejected before any side effect.
pub fn emit_action_rejected(repo_name: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "action.rejected", repo_name = %repo_name, reason = %reason);
}

/// Emit event: the coordinator is calling a stage executor.
pub fn emit_stage_started(action_uid: &str, stage: &str, predecessor_status: &str) {
    info!(
        event = "stage.started",
        action_uid = %action_uid,
        stage = %stage,
        predecessor = %predecessor_status,
    );
}

/// Emit event: a stage produced its result.
pub fn emit_stage_finished(action_uid: &str, stage: &str, status: &str, eta: &str) {
    info!(
        event = "stage.finished",
        action_uid = %action_uid,
        stage = %stage,
        status = %status,
        eta = %eta,
    );
}

/// Emit event: the call to a stage executor failed in transport.
pub fn emit_stage_call_failed(action_uid: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.call_failed", action_uid = %action_uid, stage = %stage, error = %error);
}

/// Emit event: an executor could not report its status to the store.
pub fn emit_status_report_failed(action_uid: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "stage.report_failed",
        action_uid = %action_uid,
        stage = %stage,
        error = %error,
    );
}

/// Emit event: a batch of log rows reached storage.
pub fn emit_logs_flushed(count: usize, duration_ms: u64) {
    info!(event = "logs.flushed", count = count, duration_ms = duration_ms);
}

/// Emit event: a batch write failed; the rows are kept for a later attempt.
pub fn emit_logs_flush_failed(count: usize, error: &dyn std::fmt::Display) {
    warn!(event = "logs.flush_failed", count = count, error = %error);
}

/// Emit event: the retention cap discarded the oldest buffered rows.
pub fn emit_logs_dropped(dropped: usize, cap: usize) {
    error!(event = "logs.dropped", dropped = dropped, cap = cap);
}

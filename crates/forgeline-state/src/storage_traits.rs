//! Storage trait definitions for Forgeline
//!
//! These traits define the two persistence seams of the pipeline:
//! - `ActionStore`: one record per pipeline run, stage columns updated by executors
//! - `LogStore`: bulk-inserted stage output lines, read back per (action, service)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{ActionRecord, ActionUid, Stage, StageStatus, StageUpdate};
use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ActionStore: pipeline run records
// ---------------------------------------------------------------------------

/// Durable store of action records.
///
/// Guarantees:
/// - `create` inserts exactly once per `action_uid`; a second insert fails.
/// - `update_stage` writes the status and ETA columns of one stage together.
///   Different stages of the same record never interfere with each other.
/// - `list_by_repo_for_user` returns records newest first (`started_at` DESC).
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Insert the initial record of a run.
    async fn create(&self, record: &ActionRecord) -> StorageResult<()>;

    /// Write one stage's terminal status and ETA.
    async fn update_stage(&self, action_uid: &ActionUid, update: &StageUpdate)
        -> StorageResult<()>;

    /// Fetch a single record.
    async fn get(&self, action_uid: &ActionUid) -> StorageResult<ActionRecord>;

    /// All runs of `repo_name` triggered by `user_id`, newest first.
    async fn list_by_repo_for_user(
        &self,
        repo_name: &str,
        user_id: &str,
    ) -> StorageResult<Vec<ActionRecord>>;
}

/// Check an update against the record it targets.
///
/// A stage that the action never requested stays `N/A`, and a stage cannot
/// be moved back to `Pending` once created.
pub fn validate_update(record: &ActionRecord, update: &StageUpdate) -> StorageResult<()> {
    if !record.action_type.includes(update.stage) {
        return Err(StorageError::StageNotRequested {
            action_uid: record.action_uid.to_string(),
            stage: update.stage.to_string(),
        });
    }
    if update.status == StageStatus::Pending {
        return Err(StorageError::InvalidUpdate {
            action_uid: record.action_uid.to_string(),
            reason: format!("{} cannot be reset to Pending", update.stage),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LogStore: stage output lines
// ---------------------------------------------------------------------------

/// One line of stage output on its way to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub action_uid: ActionUid,
    pub service: Stage,
    #[serde(alias = "time")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "log")]
    pub text: String,
}

impl LogEvent {
    /// Create an event stamped with the current time.
    pub fn now(action_uid: ActionUid, service: Stage, text: impl Into<String>) -> Self {
        Self {
            action_uid,
            service,
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

/// A stored log line as returned by the read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub time: DateTime<Utc>,
    pub log_text: String,
}

/// Durable store of log rows.
///
/// Guarantees:
/// - `insert_batch` writes the whole slice as one operation; on error none
///   of it is considered written.
/// - `read_logs` returns the lines of one `(action_uid, service)` pair ordered
///   by time ascending.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Bulk insert a batch of events.
    async fn insert_batch(&self, events: &[LogEvent]) -> StorageResult<()>;

    /// Read the lines of one stage of one action, oldest first.
    async fn read_logs(&self, action_uid: &ActionUid, service: Stage)
        -> StorageResult<Vec<LogLine>>;
}

//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryActionStore` and `MemoryLogStore` that satisfy the trait
//! contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::action::{ActionRecord, ActionUid, Stage, StageUpdate};
use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryActionStore
// ---------------------------------------------------------------------------

/// In-memory action store backed by a `HashMap<action_uid, ActionRecord>`.
#[derive(Debug, Default)]
pub struct MemoryActionStore {
    actions: Mutex<HashMap<String, ActionRecord>>,
}

impl MemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionStore for MemoryActionStore {
    async fn create(&self, record: &ActionRecord) -> StorageResult<()> {
        let mut actions = self.actions.lock().unwrap();
        let key = record.action_uid.0.clone();
        if actions.contains_key(&key) {
            return Err(StorageError::ActionExists { action_uid: key });
        }
        actions.insert(key, record.clone());
        Ok(())
    }

    async fn update_stage(
        &self,
        action_uid: &ActionUid,
        update: &StageUpdate,
    ) -> StorageResult<()> {
        let mut actions = self.actions.lock().unwrap();
        let record = actions
            .get_mut(&action_uid.0)
            .ok_or_else(|| StorageError::ActionNotFound {
                action_uid: action_uid.0.clone(),
            })?;
        validate_update(record, update)?;
        record.set_stage(update.stage, update.status, update.eta.clone());
        Ok(())
    }

    async fn get(&self, action_uid: &ActionUid) -> StorageResult<ActionRecord> {
        let actions = self.actions.lock().unwrap();
        actions
            .get(&action_uid.0)
            .cloned()
            .ok_or_else(|| StorageError::ActionNotFound {
                action_uid: action_uid.0.clone(),
            })
    }

    async fn list_by_repo_for_user(
        &self,
        repo_name: &str,
        user_id: &str,
    ) -> StorageResult<Vec<ActionRecord>> {
        let actions = self.actions.lock().unwrap();
        let mut records: Vec<ActionRecord> = actions
            .values()
            .filter(|r| r.repo_name == repo_name && r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at)); // newest first
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// MemoryLogStore
// ---------------------------------------------------------------------------

/// In-memory log store that keeps every accepted batch.
///
/// Writes can be made to fail on demand to exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    batches: Mutex<Vec<Vec<LogEvent>>>,
    fail_writes: AtomicBool,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `insert_batch` calls fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every batch accepted so far, in write order.
    pub fn batches(&self) -> Vec<Vec<LogEvent>> {
        self.batches.lock().unwrap().clone()
    }

    /// Total number of stored rows.
    pub fn row_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert_batch(&self, events: &[LogEvent]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("log store unavailable".to_string()));
        }
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }

    async fn read_logs(
        &self,
        action_uid: &ActionUid,
        service: Stage,
    ) -> StorageResult<Vec<LogLine>> {
        let batches = self.batches.lock().unwrap();
        let mut rows: Vec<&LogEvent> = batches
            .iter()
            .flatten()
            .filter(|e| e.action_uid == *action_uid && e.service == service)
            .collect();
        // stable: equal timestamps keep insertion order
        rows.sort_by_key(|e| e.timestamp);
        Ok(rows
            .into_iter()
            .map(|e| LogLine {
                time: e.timestamp,
                log_text: e.text.clone(),
            })
            .collect())
    }
}

//! SurrealDB-backed ActionStore and LogStore implementation
//!
//! Uses `schema::ActionRow` and `schema::LogRow` for persistence,
//! converting to/from domain types at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::debug;

use crate::action::{ActionRecord, ActionUid, Stage, StageUpdate};
use crate::connection;
use crate::error::StorageError;
use crate::schema::{ActionRow, LogRow};
use crate::storage_traits::{
    validate_update, ActionStore, LogEvent, LogLine, LogStore, StorageResult,
};

/// SurrealDB-backed implementation of [`ActionStore`] and [`LogStore`].
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Wrap an already connected and migrated database.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(connection::connect_url("mem://").await?))
    }

    /// Connect to an explicit URL.
    pub async fn connect(url: &str) -> crate::Result<Self> {
        Ok(Self::new(connection::connect_url(url).await?))
    }

    /// Create from environment variables, see [`connection::connect_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(connection::connect_from_env().await?))
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch an action row by uid, returning ActionNotFound if absent.
    async fn fetch_action(&self, uid: &str) -> StorageResult<ActionRow> {
        let uid_owned = uid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM actions WHERE action_uid = $uid")
            .bind(("uid", uid_owned))
            .await?;

        let rows: Vec<ActionRow> = res.take(0)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::ActionNotFound {
                action_uid: uid.to_string(),
            })
    }
}

/// Whether `err` is a violation of the `idx_action_uid` unique index.
///
/// Embedded engines and remote connections report it with the same text,
/// so the message is matched rather than the error variant.
fn is_duplicate_uid(err: &surrealdb::Error) -> bool {
    let message = err.to_string();
    message.contains("idx_action_uid") && message.contains("already contains")
}

#[async_trait]
impl ActionStore for SurrealStore {
    async fn create(&self, record: &ActionRecord) -> StorageResult<()> {
        let uid = record.action_uid.0.clone();
        debug!(action_uid = %uid, "creating action");

        // The unique index on action_uid arbitrates concurrent creates.
        let created: Result<Option<ActionRow>, surrealdb::Error> = self
            .db
            .create("actions")
            .content(ActionRow::from(record))
            .await;

        match created {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_uid(&e) => Err(StorageError::ActionExists { action_uid: uid }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_stage(
        &self,
        action_uid: &ActionUid,
        update: &StageUpdate,
    ) -> StorageResult<()> {
        let row = self.fetch_action(&action_uid.0).await?;
        validate_update(&row.into_record()?, update)?;

        // Column names come from the closed `UpdatableField` set, never from input.
        let sql = format!(
            "UPDATE actions SET {} = $status, {} = $eta WHERE action_uid = $uid",
            update.stage.status_field().column(),
            update.stage.eta_field().column(),
        );

        debug!(action_uid = %action_uid, stage = %update.stage, status = %update.status, "updating stage");

        self.db
            .query(sql)
            .bind(("status", update.status.as_str().to_string()))
            .bind(("eta", update.eta.to_string()))
            .bind(("uid", action_uid.0.clone()))
            .await?
            .check()?;

        Ok(())
    }

    async fn get(&self, action_uid: &ActionUid) -> StorageResult<ActionRecord> {
        self.fetch_action(&action_uid.0).await?.into_record()
    }

    async fn list_by_repo_for_user(
        &self,
        repo_name: &str,
        user_id: &str,
    ) -> StorageResult<Vec<ActionRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM actions WHERE repo_name = $repo AND user_id = $user \
                 ORDER BY started_at DESC",
            )
            .bind(("repo", repo_name.to_string()))
            .bind(("user", user_id.to_string()))
            .await?;

        let rows: Vec<ActionRow> = res.take(0)?;
        rows.into_iter().map(ActionRow::into_record).collect()
    }
}

#[async_trait]
impl LogStore for SurrealStore {
    async fn insert_batch(&self, events: &[LogEvent]) -> StorageResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let rows: Vec<LogRow> = events.iter().map(LogRow::from).collect();

        debug!(rows = rows.len(), "inserting log batch");

        self.db
            .query("INSERT INTO logs $rows")
            .bind(("rows", rows))
            .await?
            .check()?;

        Ok(())
    }

    async fn read_logs(
        &self,
        action_uid: &ActionUid,
        service: Stage,
    ) -> StorageResult<Vec<LogLine>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM logs WHERE action_uid = $uid AND service = $service \
                 ORDER BY time ASC",
            )
            .bind(("uid", action_uid.0.clone()))
            .bind(("service", service.service_name().to_string()))
            .await?;

        let rows: Vec<LogRow> = res.take(0)?;
        Ok(rows.into_iter().map(LogLine::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionType, RepoMetadata};

    fn record(uid: &str) -> ActionRecord {
        let repo = RepoMetadata {
            repo_id: 1,
            repo_name: "demo".to_string(),
            clone_url: "https://github.com/octo/demo.git".to_string(),
            default_branch: "main".to_string(),
        };
        ActionRecord::new(ActionUid::from(uid), "octo", &repo, ActionType::Full)
    }

    #[tokio::test]
    async fn test_duplicate_create_hits_unique_index() {
        let store = SurrealStore::in_memory().await.unwrap();
        store.create(&record("run-1")).await.unwrap();

        let err = store.create(&record("run-1")).await.unwrap_err();
        assert_eq!(
            err,
            StorageError::ActionExists {
                action_uid: "run-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_creates_store_one_row() {
        let store = SurrealStore::in_memory().await.unwrap();
        let first = record("run-race");
        let second = record("run-race");

        let (a, b) = tokio::join!(store.create(&first), store.create(&second));
        let created = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(created, 1);

        let mut res = store
            .db
            .query("SELECT * FROM actions WHERE action_uid = $uid")
            .bind(("uid", "run-race".to_string()))
            .await
            .unwrap();
        let rows: Vec<ActionRow> = res.take(0).unwrap();
        assert_eq!(rows.len(), 1);
    }
}

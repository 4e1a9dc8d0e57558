//! Schema definitions for Forgeline SurrealDB tables
//!
//! Tables:
//! - actions: One row per pipeline run, stage columns flattened
//! - logs: One row per stage output line

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{ActionRecord, ActionType, ActionUid, Eta};
use crate::error::StorageError;
use crate::storage_traits::{LogEvent, LogLine, StorageResult};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row in the `actions` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub action_uid: String,
    pub user_id: String,
    pub repo_id: i64,
    pub repo_name: String,
    pub branch: String,
    pub commit_hash: String,
    /// "full" | "scan" | "build" | "test" | "deploy"
    pub action_type: String,
    #[serde(with = "surreal_datetime")]
    pub started_at: DateTime<Utc>,
    pub scanner_status: String,
    pub scanner_eta: String,
    pub builder_status: String,
    pub builder_eta: String,
    pub tester_status: String,
    pub tester_eta: String,
    pub deployer_status: String,
    pub deployer_eta: String,
}

impl From<&ActionRecord> for ActionRow {
    fn from(r: &ActionRecord) -> Self {
        ActionRow {
            id: None,
            action_uid: r.action_uid.0.clone(),
            user_id: r.user_id.clone(),
            repo_id: r.repo_id,
            repo_name: r.repo_name.clone(),
            branch: r.branch.clone(),
            commit_hash: r.commit_hash.clone(),
            action_type: r.action_type.as_str().to_string(),
            started_at: r.started_at,
            scanner_status: r.scanner_status.as_str().to_string(),
            scanner_eta: r.scanner_eta.to_string(),
            builder_status: r.builder_status.as_str().to_string(),
            builder_eta: r.builder_eta.to_string(),
            tester_status: r.tester_status.as_str().to_string(),
            tester_eta: r.tester_eta.to_string(),
            deployer_status: r.deployer_status.as_str().to_string(),
            deployer_eta: r.deployer_eta.to_string(),
        }
    }
}

impl ActionRow {
    /// Convert a DB row back into the domain record.
    pub fn into_record(self) -> StorageResult<ActionRecord> {
        let parse_err = |e: crate::error::FieldError| {
            StorageError::Backend(format!("corrupt action row {}: {e}", self.action_uid))
        };
        let action_type: ActionType = self.action_type.parse().map_err(parse_err)?;
        Ok(ActionRecord {
            action_uid: ActionUid(self.action_uid.clone()),
            user_id: self.user_id.clone(),
            repo_id: self.repo_id,
            repo_name: self.repo_name.clone(),
            branch: self.branch.clone(),
            commit_hash: self.commit_hash.clone(),
            action_type,
            started_at: self.started_at,
            scanner_status: self.scanner_status.parse().map_err(parse_err)?,
            scanner_eta: Eta::from(self.scanner_eta.clone()),
            builder_status: self.builder_status.parse().map_err(parse_err)?,
            builder_eta: Eta::from(self.builder_eta.clone()),
            tester_status: self.tester_status.parse().map_err(parse_err)?,
            tester_eta: Eta::from(self.tester_eta.clone()),
            deployer_status: self.deployer_status.parse().map_err(parse_err)?,
            deployer_eta: Eta::from(self.deployer_eta.clone()),
        })
    }
}

/// Row in the `logs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub action_uid: String,
    /// Stage service name ("scanner", "builder", ...)
    pub service: String,
    #[serde(with = "surreal_datetime")]
    pub time: DateTime<Utc>,
    pub log_text: String,
}

impl From<&LogEvent> for LogRow {
    fn from(e: &LogEvent) -> Self {
        LogRow {
            id: None,
            action_uid: e.action_uid.0.clone(),
            service: e.service.service_name().to_string(),
            time: e.timestamp,
            log_text: e.text.clone(),
        }
    }
}

impl From<LogRow> for LogLine {
    fn from(row: LogRow) -> Self {
        LogLine {
            time: row.time,
            log_text: row.log_text,
        }
    }
}

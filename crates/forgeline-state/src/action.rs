//! Action record domain types.
//!
//! An action (or run) is one execution of the pipeline for a repository.
//! Each action owns four stage slots (scanner, builder, tester, deployer),
//! each with a status and an ETA column.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Unique identifier for a pipeline action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionUid(pub String);

impl ActionUid {
    /// Generate a new random ActionUid.
    pub fn new() -> Self {
        ActionUid(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActionUid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActionUid {
    fn from(s: &str) -> Self {
        ActionUid(s.to_string())
    }
}

/// One pipeline stage, named after the service that executes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scanner,
    Builder,
    Tester,
    Deployer,
}

impl Stage {
    /// Fixed execution order of a full pipeline.
    pub const ORDER: [Stage; 4] = [Stage::Scanner, Stage::Builder, Stage::Tester, Stage::Deployer];

    /// Service name used in log rows and record columns.
    pub fn service_name(&self) -> &'static str {
        match self {
            Stage::Scanner => "scanner",
            Stage::Builder => "builder",
            Stage::Tester => "tester",
            Stage::Deployer => "deployer",
        }
    }

    /// Verb used by the executor endpoint (`/api/v1/trigger-<verb>`).
    pub fn verb(&self) -> &'static str {
        match self {
            Stage::Scanner => "scan",
            Stage::Builder => "build",
            Stage::Tester => "test",
            Stage::Deployer => "deploy",
        }
    }

    /// Resolve a stage from its verb (`scan`) or service name (`scanner`).
    pub fn from_verb(verb: &str) -> Option<Self> {
        Stage::ORDER
            .into_iter()
            .find(|s| s.verb() == verb || s.service_name() == verb)
    }

    pub fn status_field(&self) -> UpdatableField {
        UpdatableField::Status(*self)
    }

    pub fn eta_field(&self) -> UpdatableField {
        UpdatableField::Eta(*self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

impl FromStr for Stage {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::from_verb(s).ok_or_else(|| FieldError::UnknownStage(s.to_string()))
    }
}

/// What a trigger asked for: the whole pipeline or a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Full,
    Scan,
    Build,
    Test,
    Deploy,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Full => "full",
            ActionType::Scan => "scan",
            ActionType::Build => "build",
            ActionType::Test => "test",
            ActionType::Deploy => "deploy",
        }
    }

    /// The stages this action runs, in execution order.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            ActionType::Full => &Stage::ORDER,
            ActionType::Scan => &[Stage::Scanner],
            ActionType::Build => &[Stage::Builder],
            ActionType::Test => &[Stage::Tester],
            ActionType::Deploy => &[Stage::Deployer],
        }
    }

    pub fn includes(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ActionType::Full),
            "scan" => Ok(ActionType::Scan),
            "build" => Ok(ActionType::Build),
            "test" => Ok(ActionType::Test),
            "deploy" => Ok(ActionType::Deploy),
            other => Err(FieldError::UnknownActionType(other.to_string())),
        }
    }
}

/// Status of one stage within an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    #[serde(rename = "N/A")]
    NotApplicable,
    Pending,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR", alias = "Error")]
    Error,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotApplicable => "N/A",
            StageStatus::Pending => "Pending",
            StageStatus::Ok => "OK",
            StageStatus::Error => "ERROR",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StageStatus::Ok)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "N/A" => Ok(StageStatus::NotApplicable),
            "Pending" => Ok(StageStatus::Pending),
            "OK" => Ok(StageStatus::Ok),
            "ERROR" | "Error" => Ok(StageStatus::Error),
            other => Err(FieldError::UnknownStatus(other.to_string())),
        }
    }
}

/// ETA column of a stage: not applicable, not yet known, or the measured
/// wall-clock duration formatted as `1m5s` / `0s250ms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Eta {
    NotApplicable,
    Pending,
    Elapsed(String),
}

impl From<String> for Eta {
    fn from(s: String) -> Self {
        match s.as_str() {
            "N/A" => Eta::NotApplicable,
            "Pending" => Eta::Pending,
            _ => Eta::Elapsed(s),
        }
    }
}

impl From<Eta> for String {
    fn from(eta: Eta) -> Self {
        match eta {
            Eta::NotApplicable => "N/A".to_string(),
            Eta::Pending => "Pending".to_string(),
            Eta::Elapsed(s) => s,
        }
    }
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eta::NotApplicable => f.write_str("N/A"),
            Eta::Pending => f.write_str("Pending"),
            Eta::Elapsed(s) => f.write_str(s),
        }
    }
}

/// Column names an update may target. Anything outside this set is
/// rejected before it reaches a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatableField {
    Status(Stage),
    Eta(Stage),
}

impl UpdatableField {
    pub fn stage(&self) -> Stage {
        match self {
            UpdatableField::Status(s) | UpdatableField::Eta(s) => *s,
        }
    }

    /// Column name in the `actions` table.
    pub fn column(&self) -> &'static str {
        match self {
            UpdatableField::Status(Stage::Scanner) => "scanner_status",
            UpdatableField::Status(Stage::Builder) => "builder_status",
            UpdatableField::Status(Stage::Tester) => "tester_status",
            UpdatableField::Status(Stage::Deployer) => "deployer_status",
            UpdatableField::Eta(Stage::Scanner) => "scanner_eta",
            UpdatableField::Eta(Stage::Builder) => "builder_eta",
            UpdatableField::Eta(Stage::Tester) => "tester_eta",
            UpdatableField::Eta(Stage::Deployer) => "deployer_eta",
        }
    }
}

impl FromStr for UpdatableField {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (service, kind) = s
            .rsplit_once('_')
            .ok_or_else(|| FieldError::UnknownField(s.to_string()))?;
        let stage = Stage::ORDER
            .into_iter()
            .find(|st| st.service_name() == service)
            .ok_or_else(|| FieldError::UnknownField(s.to_string()))?;
        match kind {
            "status" => Ok(UpdatableField::Status(stage)),
            "eta" => Ok(UpdatableField::Eta(stage)),
            _ => Err(FieldError::UnknownField(s.to_string())),
        }
    }
}

impl fmt::Display for UpdatableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A stage's terminal write: status and ETA always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub stage: Stage,
    pub status: StageStatus,
    pub eta: Eta,
}

impl StageUpdate {
    pub fn new(stage: Stage, status: StageStatus, eta: Eta) -> Self {
        Self { stage, status, eta }
    }

    /// Build an update from raw column names, as received over the wire.
    ///
    /// Both names must be on the allow-list and must refer to the same
    /// stage, one status column and one ETA column.
    pub fn from_columns(
        status_name: &str,
        status: &str,
        eta_name: &str,
        eta: &str,
    ) -> Result<Self, FieldError> {
        let status_field: UpdatableField = status_name.parse()?;
        let eta_field: UpdatableField = eta_name.parse()?;

        let stage = match (status_field, eta_field) {
            (UpdatableField::Status(a), UpdatableField::Eta(b)) if a == b => a,
            _ => {
                return Err(FieldError::MismatchedFields {
                    status_name: status_name.to_string(),
                    eta_name: eta_name.to_string(),
                })
            }
        };

        Ok(Self {
            stage,
            status: status.parse()?,
            eta: Eta::from(eta.to_string()),
        })
    }
}

/// Provenance resolved for a repository before a run is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub repo_id: i64,
    pub repo_name: String,
    pub clone_url: String,
    pub default_branch: String,
}

/// One pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_uid: ActionUid,
    pub user_id: String,
    pub repo_id: i64,
    pub repo_name: String,
    pub branch: String,
    pub commit_hash: String,
    pub action_type: ActionType,
    pub started_at: DateTime<Utc>,
    pub scanner_status: StageStatus,
    pub scanner_eta: Eta,
    pub builder_status: StageStatus,
    pub builder_eta: Eta,
    pub tester_status: StageStatus,
    pub tester_eta: Eta,
    pub deployer_status: StageStatus,
    pub deployer_eta: Eta,
}

impl ActionRecord {
    /// Build the initial record for a freshly triggered action.
    ///
    /// Stages that are part of `action_type` start `Pending`; every other
    /// stage is `N/A` and stays that way.
    pub fn new(
        action_uid: ActionUid,
        user_id: impl Into<String>,
        repo: &RepoMetadata,
        action_type: ActionType,
    ) -> Self {
        let mut record = Self {
            action_uid,
            user_id: user_id.into(),
            repo_id: repo.repo_id,
            repo_name: repo.repo_name.clone(),
            branch: repo.default_branch.clone(),
            commit_hash: "None".to_string(),
            action_type,
            started_at: Utc::now(),
            scanner_status: StageStatus::NotApplicable,
            scanner_eta: Eta::NotApplicable,
            builder_status: StageStatus::NotApplicable,
            builder_eta: Eta::NotApplicable,
            tester_status: StageStatus::NotApplicable,
            tester_eta: Eta::NotApplicable,
            deployer_status: StageStatus::NotApplicable,
            deployer_eta: Eta::NotApplicable,
        };
        for stage in action_type.stages() {
            record.set_stage(*stage, StageStatus::Pending, Eta::Pending);
        }
        record
    }

    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Scanner => self.scanner_status,
            Stage::Builder => self.builder_status,
            Stage::Tester => self.tester_status,
            Stage::Deployer => self.deployer_status,
        }
    }

    pub fn stage_eta(&self, stage: Stage) -> &Eta {
        match stage {
            Stage::Scanner => &self.scanner_eta,
            Stage::Builder => &self.builder_eta,
            Stage::Tester => &self.tester_eta,
            Stage::Deployer => &self.deployer_eta,
        }
    }

    pub fn set_stage(&mut self, stage: Stage, status: StageStatus, eta: Eta) {
        let (status_slot, eta_slot) = match stage {
            Stage::Scanner => (&mut self.scanner_status, &mut self.scanner_eta),
            Stage::Builder => (&mut self.builder_status, &mut self.builder_eta),
            Stage::Tester => (&mut self.tester_status, &mut self.tester_eta),
            Stage::Deployer => (&mut self.deployer_status, &mut self.deployer_eta),
        };
        *status_slot = status;
        *eta_slot = eta;
    }

    /// Overall status derived from the stage columns: any `ERROR` wins,
    /// then any `Pending`, otherwise `OK`.
    pub fn current_status(&self) -> StageStatus {
        let statuses = Stage::ORDER.map(|s| self.stage_status(s));
        if statuses.contains(&StageStatus::Error) {
            StageStatus::Error
        } else if statuses.contains(&StageStatus::Pending) {
            StageStatus::Pending
        } else {
            StageStatus::Ok
        }
    }

    /// Whether every requested stage has been written by its executor.
    pub fn is_finished(&self) -> bool {
        self.action_type
            .stages()
            .iter()
            .all(|s| self.stage_status(*s) != StageStatus::Pending)
    }
}

/// Read-side projection of a record with its derived status attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionView {
    #[serde(flatten)]
    pub record: ActionRecord,
    pub current_status: StageStatus,
}

impl From<ActionRecord> for ActionView {
    fn from(record: ActionRecord) -> Self {
        let current_status = record.current_status();
        Self {
            record,
            current_status,
        }
    }
}

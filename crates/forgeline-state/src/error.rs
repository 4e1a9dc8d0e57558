//! Error types for forgeline-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the store traits
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StorageError {
    #[error("action not found: {action_uid}")]
    ActionNotFound { action_uid: String },

    #[error("action already exists: {action_uid}")]
    ActionExists { action_uid: String },

    #[error("stage {stage} is not part of action {action_uid}")]
    StageNotRequested { action_uid: String, stage: String },

    #[error("invalid update for action {action_uid}: {reason}")]
    InvalidUpdate { action_uid: String, reason: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Rejections for names and values arriving over the wire
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("unknown stage status: {0}")]
    UnknownStatus(String),

    #[error("field is not updatable: {0}")]
    UnknownField(String),

    #[error("status field {status_name} and eta field {eta_name} must name the same stage")]
    MismatchedFields {
        status_name: String,
        eta_name: String,
    },
}

//! Forgeline-State: SurrealDB Backend for Forgeline
//!
//! This crate provides the persistence layer of the pipeline. It owns the
//! action record (one row per pipeline run) and the stage log rows, and
//! exposes both through backend-agnostic traits.
//!
//! ## Key Components
//!
//! - `ActionRecord`: a run with its four stage slots (status + ETA each)
//! - `ActionStore` / `LogStore`: the persistence seams
//! - `SurrealStore`: SurrealDB implementation of both stores
//! - `fakes`: in-memory implementations for tests

pub mod action;
pub mod connection;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use action::{
    ActionRecord, ActionType, ActionUid, ActionView, Eta, RepoMetadata, Stage, StageStatus,
    StageUpdate, UpdatableField,
};
pub use connection::CloudConfig;
pub use error::{FieldError, StateError, StorageError};
pub use migrations::init_schema;
pub use schema::{ActionRow, LogRow};
pub use storage_traits::{
    validate_update, ActionStore, LogEvent, LogLine, LogStore, StorageResult,
};
pub use surreal_store::SurrealStore;

/// Result type for forgeline-state operations
pub type Result<T> = std::result::Result<T, StateError>;

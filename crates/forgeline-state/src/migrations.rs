//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with proper constraints and indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Forgeline tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Forgeline SurrealDB schema");

    init_actions_table(db).await?;
    init_logs_table(db).await?;

    info!("Forgeline schema initialization complete");
    Ok(())
}

/// Initialize `actions` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE actions {
///   action_uid:       STRING (primary key, unique)
///   user_id:          STRING (indexed with repo_name)
///   repo_id:          INT
///   repo_name:        STRING
///   branch:           STRING
///   commit_hash:      STRING
///   action_type:      STRING (enum: full | scan | build | test | deploy)
///   started_at:       DATETIME (indexed)
///   <stage>_status:   STRING (enum: N/A | Pending | OK | ERROR)
///   <stage>_eta:      STRING (N/A | Pending | formatted duration)
/// }
/// ```
///
/// Constraints:
/// - `action_uid` is unique (prevents duplicate runs)
/// - rows are never deleted
async fn init_actions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing actions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS actions AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_action_uid ON TABLE actions COLUMNS action_uid UNIQUE;

        -- Run list of a repository for one user, newest first
        DEFINE INDEX IF NOT EXISTS idx_repo_user ON TABLE actions COLUMNS repo_name, user_id;

        DEFINE INDEX IF NOT EXISTS idx_started_at ON TABLE actions COLUMNS started_at;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ actions table initialized");
    Ok(())
}

/// Initialize `logs` table with indexes
///
/// Schema:
/// ```text
/// TABLE logs {
///   action_uid: STRING (foreign key to actions.action_uid)
///   service:    STRING (scanner | builder | tester | deployer)
///   time:       DATETIME
///   log_text:   STRING
/// }
/// ```
///
/// Reads are always `(action_uid, service)` ordered by `time`.
async fn init_logs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing logs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS logs AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_logs_action_service ON TABLE logs COLUMNS action_uid, service, time;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ logs table initialized");
    Ok(())
}

//! Forgeline daemon
//!
//! One binary, three roles:
//! - `coordinator`: accepts triggers and drives stage sequences
//! - `store`: action records, stage updates and the log aggregator
//! - `executor`: runs one stage's command on request

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod serve;

pub use auth::{AuthError, Claims, JwtVerifier};
pub use config::{Cli, CoordinatorArgs, ExecutorArgs, Role, StoreArgs};
pub use error::ApiError;

//! Forgeline CI - pipeline coordination and stage execution
//!
//! Provides:
//! - The coordinator that validates triggers, records the run and drives
//!   scan → build → test → deploy through a [`StageClient`]
//! - The executor harness that runs a stage's tool, streams its output and
//!   reports the stage's status
//! - A bounded worker pool for background runs
//! - [`HttpActionStore`], the store daemon's record API as an `ActionStore`

pub mod client;
pub mod coordinator;
pub mod eta;
pub mod executor;
pub mod pool;
pub mod repo;
pub mod runner;
pub mod stage;
pub mod store_client;

// Re-export key types
pub use client::{ClientError, HttpStageClient, LocalStageClient, StageClient, StageEndpoints};
pub use coordinator::{
    run_stages, Coordinator, PipelineResult, RunAccepted, TriggerError, TriggerRequest,
};
pub use eta::format_elapsed;
pub use executor::{StageExecutor, StageLog, StageTool, StatusReporter, StoreStatusReporter};
pub use pool::{PoolStats, RunHandle, WorkerPool};
pub use repo::{GithubRepoProvider, RepoError, RepoMetadataProvider, StaticRepoProvider};
pub use runner::CommandTool;
pub use stage::{
    default_image_tag, trigger_path, OAuthToken, RunContext, StageOutcome, StageRequest,
};
pub use store_client::HttpActionStore;

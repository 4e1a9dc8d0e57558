//! Pipeline coordination: trigger validation, initial record, stage sequencing.

use std::sync::Arc;

use forgeline_core::{obs, METRICS};
use forgeline_state::{
    ActionRecord, ActionStore, ActionType, ActionUid, Eta, FieldError, Stage, StageStatus,
    StageUpdate, StorageError,
};
use thiserror::Error;
use tracing::{info, Instrument};

use crate::client::StageClient;
use crate::pool::{RunHandle, WorkerPool};
use crate::repo::{RepoError, RepoMetadataProvider};
use crate::stage::{OAuthToken, RunContext, StageOutcome, StageRequest};

/// Reasons a trigger is refused. Nothing is recorded or started.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("missing user identity")]
    MissingUser,

    #[error(transparent)]
    InvalidActionType(#[from] FieldError),

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("repository lookup failed: {0}")]
    RepoLookup(String),

    #[error("failed to record action: {0}")]
    Store(#[from] StorageError),
}

impl TriggerError {
    /// HTTP status the trigger endpoint answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            TriggerError::MissingUser
            | TriggerError::InvalidActionType(_)
            | TriggerError::RepoNotFound(_) => 400,
            TriggerError::RepoLookup(_) => 502,
            TriggerError::Store(_) => 500,
        }
    }
}

impl From<RepoError> for TriggerError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(name) => TriggerError::RepoNotFound(name),
            RepoError::Provider(msg) => TriggerError::RepoLookup(msg),
        }
    }
}

/// A request to start a run.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub repo_name: String,
    pub action_type: String,
    pub oauth_token: OAuthToken,
    pub jwt_token: String,
    /// Verified identity of the caller.
    pub username: String,
}

/// Result of a complete stage sequence.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub action_uid: ActionUid,
    /// Every stage called, in order, with its outcome.
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl PipelineResult {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, o)| o)
    }

    /// Whether every called stage answered OK.
    pub fn success(&self) -> bool {
        self.stages.iter().all(|(_, o)| o.is_ok())
    }
}

/// An accepted trigger: the run is recorded and running in the pool.
#[derive(Debug)]
pub struct RunAccepted {
    pub action_uid: ActionUid,
    pub message: String,
    pub handle: RunHandle<PipelineResult>,
}

pub struct Coordinator {
    store: Arc<dyn ActionStore>,
    client: Arc<dyn StageClient>,
    repos: Arc<dyn RepoMetadataProvider>,
    pool: WorkerPool,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ActionStore>,
        client: Arc<dyn StageClient>,
        repos: Arc<dyn RepoMetadataProvider>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            client,
            repos,
            pool,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Validate, record and launch a run.
    ///
    /// Returns once the initial record is stored; the stages run in the
    /// worker pool.
    pub async fn start_run(&self, req: TriggerRequest) -> Result<RunAccepted, TriggerError> {
        match self.accept(req).await {
            Ok(accepted) => Ok(accepted),
            Err((repo_name, e)) => {
                obs::emit_action_rejected(&repo_name, &e);
                Err(e)
            }
        }
    }

    async fn accept(&self, req: TriggerRequest) -> Result<RunAccepted, (String, TriggerError)> {
        let reject = |e: TriggerError| (req.repo_name.clone(), e);

        if req.username.trim().is_empty() {
            return Err(reject(TriggerError::MissingUser));
        }
        let action_type: ActionType = req
            .action_type
            .parse()
            .map_err(|e: FieldError| reject(e.into()))?;

        let repo = self
            .repos
            .resolve(&req.repo_name, &req.oauth_token)
            .await
            .map_err(|e| reject(e.into()))?;

        let action_uid = ActionUid::new();
        let record = ActionRecord::new(action_uid.clone(), &req.username, &repo, action_type);
        self.store
            .create(&record)
            .await
            .map_err(|e| reject(e.into()))?;

        obs::emit_action_triggered(
            action_uid.as_str(),
            &repo.repo_name,
            action_type.as_str(),
            &req.username,
        );
        METRICS.inc_runs_triggered();

        let ctx = RunContext {
            action_uid: action_uid.clone(),
            repo_name: repo.repo_name.clone(),
            git_repo_url: repo.clone_url.clone(),
            oauth_token: req.oauth_token,
            jwt_token: req.jwt_token,
            username: req.username,
        };
        let client = self.client.clone();
        let store = self.store.clone();
        let span = obs::action_span(action_uid.as_str());
        let handle = self.pool.submit(
            async move { run_stages(client.as_ref(), store.as_ref(), &ctx, action_type).await }
                .instrument(span),
        );

        Ok(RunAccepted {
            message: format!(
                "{} action triggered for repository: {}.",
                capitalize(action_type.as_str()),
                repo.repo_name
            ),
            action_uid,
            handle,
        })
    }
}

/// Drive the stages of `action_type` in order.
///
/// The first stage gets a synthetic OK predecessor; each later stage gets
/// the previous stage's outcome, including a non-OK one, which the
/// executor turns into `N/A`. The image tag is carried forward until a
/// stage replaces it.
///
/// A stage whose executor cannot be reached never reports its own status,
/// so it is written to `store` here: `ERROR` after an OK predecessor,
/// `N/A` otherwise.
pub async fn run_stages(
    client: &dyn StageClient,
    store: &dyn ActionStore,
    ctx: &RunContext,
    action_type: ActionType,
) -> PipelineResult {
    let mut predecessor = StageOutcome::ok();
    let mut stages = Vec::with_capacity(action_type.stages().len());

    for &stage in action_type.stages() {
        let request = StageRequest::new(ctx, &predecessor);
        obs::emit_stage_started(
            ctx.action_uid.as_str(),
            stage.service_name(),
            request.status.as_str(),
        );

        let mut outcome = match client.invoke(stage, &request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                obs::emit_stage_call_failed(ctx.action_uid.as_str(), stage.service_name(), &e);
                record_unreachable(store, &ctx.action_uid, stage, request.status).await
            }
        };
        if outcome.image_tag.is_none() {
            outcome.image_tag = predecessor.image_tag.clone();
        }

        stages.push((stage, outcome.clone()));
        predecessor = outcome;
    }

    let result = PipelineResult {
        action_uid: ctx.action_uid.clone(),
        stages,
    };
    let final_status = result
        .stages
        .last()
        .map(|(_, o)| o.status)
        .unwrap_or(StageStatus::NotApplicable);
    info!(
        success = result.success(),
        last_status = %final_status,
        "pipeline finished"
    );
    result
}

/// Store the status an unreachable stage would have reported and return
/// it as the stage's outcome. Storage failures are logged and ignored.
async fn record_unreachable(
    store: &dyn ActionStore,
    action_uid: &ActionUid,
    stage: Stage,
    predecessor: StageStatus,
) -> StageOutcome {
    let status = if predecessor.is_ok() {
        StageStatus::Error
    } else {
        StageStatus::NotApplicable
    };
    let update = StageUpdate::new(stage, status, Eta::NotApplicable);
    if let Err(e) = store.update_stage(action_uid, &update).await {
        obs::emit_status_report_failed(action_uid.as_str(), stage.service_name(), &e);
    }
    StageOutcome::with_status(status)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

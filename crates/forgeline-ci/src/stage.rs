//! Wire types exchanged between the coordinator and stage executors.

use std::fmt;

use forgeline_state::{ActionUid, Stage, StageStatus};
use serde::{Deserialize, Serialize};

/// OAuth token as forwarded by the front end: either the bare access token
/// or the full token object carrying an `access_token` field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OAuthToken {
    Bare(String),
    Full { access_token: String },
}

impl OAuthToken {
    pub fn access_token(&self) -> &str {
        match self {
            OAuthToken::Bare(t) => t,
            OAuthToken::Full { access_token } => access_token,
        }
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OAuthToken(***)")
    }
}

impl From<&str> for OAuthToken {
    fn from(s: &str) -> Self {
        OAuthToken::Bare(s.to_string())
    }
}

/// Everything a stage needs to know about the run it belongs to.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub action_uid: ActionUid,
    pub repo_name: String,
    pub git_repo_url: String,
    pub oauth_token: OAuthToken,
    pub jwt_token: String,
    pub username: String,
}

/// Body of `POST /api/v1/trigger-<verb>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRequest {
    pub repo_name: String,
    pub oauth_token: OAuthToken,
    pub jwt_token: String,
    pub action_uid: ActionUid,
    pub username: String,
    /// Status of the predecessor stage.
    pub status: StageStatus,
    #[serde(default)]
    pub git_repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
}

impl StageRequest {
    /// Build the request for the stage following `predecessor`.
    pub fn new(ctx: &RunContext, predecessor: &StageOutcome) -> Self {
        Self {
            repo_name: ctx.repo_name.clone(),
            oauth_token: ctx.oauth_token.clone(),
            jwt_token: ctx.jwt_token.clone(),
            action_uid: ctx.action_uid.clone(),
            username: ctx.username.clone(),
            status: predecessor.status,
            git_repo_url: ctx.git_repo_url.clone(),
            image_tag: predecessor.image_tag.clone(),
        }
    }
}

/// Response of a stage executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

impl StageOutcome {
    /// Synthetic OK predecessor of the first stage of a run.
    pub fn ok() -> Self {
        Self::with_status(StageStatus::Ok)
    }

    /// Local result for a stage that could not be reached.
    pub fn error() -> Self {
        Self::with_status(StageStatus::Error)
    }

    pub fn with_status(status: StageStatus) -> Self {
        Self {
            status,
            image_tag: None,
            eta: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Image tag the build stage produces when none is supplied.
pub fn default_image_tag(repo_name: &str) -> String {
    format!("{repo_name}_image:latest").to_lowercase()
}

/// Executor endpoint path for a stage.
pub fn trigger_path(stage: Stage) -> String {
    format!("/api/v1/trigger-{}", stage.verb())
}

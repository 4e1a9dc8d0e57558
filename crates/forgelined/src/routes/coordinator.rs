//! Coordinator role.
//!
//! - `POST /api/v1/trigger-action`: verify the caller, record and start a run
//! - `GET  /api/v1/info`

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use forgeline_ci::{Coordinator, OAuthToken, PoolStats, TriggerRequest};
use forgeline_state::ActionUid;
use serde::{Deserialize, Serialize};

use crate::auth::JwtVerifier;
use crate::error::ApiError;
use crate::routes::{info, Info, INFO_PATH};

pub const TRIGGER_ACTION_PATH: &str = "/api/v1/trigger-action";

#[derive(Clone)]
pub struct CoordinatorState {
    pub coordinator: Arc<Coordinator>,
    pub verifier: Arc<JwtVerifier>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerActionBody {
    pub repo_name: String,
    pub action_type: String,
    pub oauth_token: OAuthToken,
    pub jwt_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerActionResponse {
    pub message: String,
    pub action_uid: ActionUid,
}

#[derive(Debug, Serialize)]
struct CoordinatorInfo {
    #[serde(flatten)]
    info: Info,
    pool: PoolStats,
}

pub fn router(state: CoordinatorState) -> Router {
    Router::new()
        .route(TRIGGER_ACTION_PATH, post(trigger_action))
        .route(INFO_PATH, get(coordinator_info))
        .with_state(state)
}

async fn trigger_action(
    State(state): State<CoordinatorState>,
    Json(body): Json<TriggerActionBody>,
) -> Result<(StatusCode, Json<TriggerActionResponse>), ApiError> {
    let username = state.verifier.verify(&body.jwt_token)?;

    let accepted = state
        .coordinator
        .start_run(TriggerRequest {
            repo_name: body.repo_name,
            action_type: body.action_type,
            oauth_token: body.oauth_token,
            jwt_token: body.jwt_token,
            username,
        })
        .await?;

    // the run owns itself from here on
    drop(accepted.handle);

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerActionResponse {
            message: accepted.message,
            action_uid: accepted.action_uid,
        }),
    ))
}

async fn coordinator_info(State(state): State<CoordinatorState>) -> Json<CoordinatorInfo> {
    Json(CoordinatorInfo {
        info: info("Coordinator").0,
        pool: state.coordinator.pool().stats(),
    })
}

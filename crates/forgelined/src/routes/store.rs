//! Store role: action records, stage updates, log ingest and log reads.
//!
//! - `POST /api/v1/write-action`
//! - `POST /api/v1/update-action`
//! - `GET  /api/v1/action/:action_uid`
//! - `GET  /api/v1/read-action/:repo_name` (Bearer JWT)
//! - `POST /api/v1/log-events` (one event or an array)
//! - `GET  /api/v1/logs/:action_uid/:service`
//! - `GET  /api/v1/info`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use forgeline_core::{LogPublisher, LOG_EVENTS_PATH};
use forgeline_state::{
    ActionRecord, ActionStore, ActionUid, ActionView, LogEvent, LogLine, LogStore, Stage,
    StageUpdate,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::JwtVerifier;
use crate::error::ApiError;
use crate::routes::{info, Info, Message, INFO_PATH};

#[derive(Clone)]
pub struct StoreState {
    pub actions: Arc<dyn ActionStore>,
    pub logs: Arc<dyn LogStore>,
    /// Feeds the aggregator's channel.
    pub ingest: Arc<dyn LogPublisher>,
    pub verifier: Arc<JwtVerifier>,
}

/// Body of `POST /api/v1/update-action`; column names as on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateActionBody {
    pub action_uid: ActionUid,
    pub status_name: String,
    pub status: String,
    pub eta_name: String,
    pub eta: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LogEventsBody {
    One(LogEvent),
    Many(Vec<LogEvent>),
}

impl LogEventsBody {
    fn into_events(self) -> Vec<LogEvent> {
        match self {
            LogEventsBody::One(event) => vec![event],
            LogEventsBody::Many(events) => events,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Accepted {
    pub accepted: usize,
}

pub fn router(state: StoreState) -> Router {
    Router::new()
        .route("/api/v1/write-action", post(write_action))
        .route("/api/v1/update-action", post(update_action))
        .route("/api/v1/action/:action_uid", get(read_action))
        .route("/api/v1/read-action/:repo_name", get(read_actions))
        .route(LOG_EVENTS_PATH, post(ingest_log_events))
        .route("/api/v1/logs/:action_uid/:service", get(read_logs))
        .route(INFO_PATH, get(store_info))
        .with_state(state)
}

async fn write_action(
    State(state): State<StoreState>,
    Json(record): Json<ActionRecord>,
) -> Result<Json<Message>, ApiError> {
    state.actions.create(&record).await?;
    Ok(Message::new(format!("Action {} written", record.action_uid)))
}

async fn update_action(
    State(state): State<StoreState>,
    Json(body): Json<UpdateActionBody>,
) -> Result<Json<Message>, ApiError> {
    let update = StageUpdate::from_columns(&body.status_name, &body.status, &body.eta_name, &body.eta)?;
    state.actions.update_stage(&body.action_uid, &update).await?;
    debug!(
        action_uid = %body.action_uid,
        stage = %update.stage,
        status = %update.status,
        "stage update stored"
    );
    Ok(Message::new(format!(
        "Action {} updated: {} = {}",
        body.action_uid, body.status_name, body.status
    )))
}

async fn read_action(
    State(state): State<StoreState>,
    Path(action_uid): Path<String>,
) -> Result<Json<ActionView>, ApiError> {
    let record = state.actions.get(&ActionUid(action_uid)).await?;
    Ok(Json(ActionView::from(record)))
}

async fn read_actions(
    State(state): State<StoreState>,
    Path(repo_name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ActionView>>, ApiError> {
    let username = state.verifier.verify_headers(&headers)?;
    let records = state
        .actions
        .list_by_repo_for_user(&repo_name, &username)
        .await?;
    Ok(Json(records.into_iter().map(ActionView::from).collect()))
}

async fn ingest_log_events(
    State(state): State<StoreState>,
    Json(body): Json<LogEventsBody>,
) -> (StatusCode, Json<Accepted>) {
    let events = body.into_events();
    let accepted = events.len();
    for event in events {
        state.ingest.publish(event);
    }
    (StatusCode::ACCEPTED, Json(Accepted { accepted }))
}

async fn read_logs(
    State(state): State<StoreState>,
    Path((action_uid, service)): Path<(String, String)>,
) -> Result<Json<Vec<LogLine>>, ApiError> {
    let stage: Stage = service.parse()?;
    let lines = state
        .logs
        .read_logs(&ActionUid(action_uid), stage)
        .await?;
    Ok(Json(lines))
}

async fn store_info() -> Json<Info> {
    info("Store")
}

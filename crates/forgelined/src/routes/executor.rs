//! Executor role: `POST /api/v1/trigger-<verb>` for the configured stage.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use forgeline_ci::{trigger_path, StageExecutor, StageOutcome, StageRequest};

use crate::routes::{info, Info, INFO_PATH};

#[derive(Clone)]
pub struct ExecutorState {
    pub executor: Arc<StageExecutor>,
}

pub fn router(state: ExecutorState) -> Router {
    let path = trigger_path(state.executor.stage());
    Router::new()
        .route(&path, post(trigger_stage))
        .route(INFO_PATH, get(executor_info))
        .with_state(state)
}

async fn trigger_stage(
    State(state): State<ExecutorState>,
    Json(request): Json<StageRequest>,
) -> Json<StageOutcome> {
    Json(state.executor.execute(&request).await)
}

async fn executor_info(State(state): State<ExecutorState>) -> Json<Info> {
    let name = state.executor.stage().service_name();
    let mut chars = name.chars();
    let title: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    info(&title)
}

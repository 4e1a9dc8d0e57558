//! HTTP error mapping: every failure answers `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forgeline_ci::TriggerError;
use forgeline_state::{FieldError, StorageError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Field(#[from] FieldError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Trigger(e) => StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Storage(e) => match e {
                StorageError::ActionNotFound { .. } => StatusCode::NOT_FOUND,
                StorageError::ActionExists { .. } => StatusCode::CONFLICT,
                StorageError::StageNotRequested { .. } | StorageError::InvalidUpdate { .. } => {
                    StatusCode::BAD_REQUEST
                }
                StorageError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Field(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

//! HTTP surfaces of the three daemon roles.
//!
//! Every role answers `GET /api/v1/info` with `{name, status}`.

pub mod coordinator;
pub mod executor;
pub mod store;

use axum::Json;
use serde::{Deserialize, Serialize};

pub const INFO_PATH: &str = "/api/v1/info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    pub status: String,
}

pub(crate) fn info(name: &str) -> Json<Info> {
    Json(Info {
        name: name.to_string(),
        status: "running".to_string(),
    })
}

/// Plain `{message}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub(crate) fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

//! Remote action store: the store daemon's record API over HTTP.
//!
//! - `create` → `POST /api/v1/write-action`
//! - `update_stage` → `POST /api/v1/update-action`
//! - `get` → `GET /api/v1/action/:action_uid`

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use forgeline_state::{ActionRecord, ActionStore, ActionUid, StageUpdate, StorageError, StorageResult};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/update-action`.
#[derive(Debug, Serialize)]
struct UpdateActionBody<'a> {
    action_uid: &'a ActionUid,
    status_name: &'static str,
    status: &'static str,
    eta_name: &'static str,
    eta: String,
}

impl<'a> UpdateActionBody<'a> {
    fn new(action_uid: &'a ActionUid, update: &StageUpdate) -> Self {
        Self {
            action_uid,
            status_name: update.stage.status_field().column(),
            status: update.status.as_str(),
            eta_name: update.stage.eta_field().column(),
            eta: update.eta.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`ActionStore`] backed by a remote store daemon.
///
/// Listing is scoped to a verified caller and only served by the
/// authenticated read API, so [`ActionStore::list_by_repo_for_user`]
/// answers with a backend error.
pub struct HttpActionStore {
    client: reqwest::Client,
    base: String,
}

impl HttpActionStore {
    pub fn new(store_url: &str, request_timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = request_timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build().context("building store HTTP client")?,
            base: store_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn transport(err: reqwest::Error) -> StorageError {
    StorageError::Backend(format!("store request failed: {err}"))
}

/// Split a non-2xx answer into its status and the store's error message.
async fn rejection(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let reason = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    (status, reason)
}

fn unexpected(status: StatusCode, reason: String) -> StorageError {
    StorageError::Backend(format!("store answered HTTP {}: {reason}", status.as_u16()))
}

#[async_trait]
impl ActionStore for HttpActionStore {
    async fn create(&self, record: &ActionRecord) -> StorageResult<()> {
        let response = self
            .client
            .post(self.url("/api/v1/write-action"))
            .json(record)
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            return Ok(());
        }
        match rejection(response).await {
            (StatusCode::CONFLICT, _) => Err(StorageError::ActionExists {
                action_uid: record.action_uid.0.clone(),
            }),
            (status, reason) => Err(unexpected(status, reason)),
        }
    }

    async fn update_stage(
        &self,
        action_uid: &ActionUid,
        update: &StageUpdate,
    ) -> StorageResult<()> {
        let response = self
            .client
            .post(self.url("/api/v1/update-action"))
            .json(&UpdateActionBody::new(action_uid, update))
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            return Ok(());
        }
        match rejection(response).await {
            (StatusCode::NOT_FOUND, _) => Err(StorageError::ActionNotFound {
                action_uid: action_uid.0.clone(),
            }),
            (StatusCode::BAD_REQUEST, reason) => Err(StorageError::InvalidUpdate {
                action_uid: action_uid.0.clone(),
                reason,
            }),
            (status, reason) => Err(unexpected(status, reason)),
        }
    }

    async fn get(&self, action_uid: &ActionUid) -> StorageResult<ActionRecord> {
        let response = self
            .client
            .get(self.url(&format!("/api/v1/action/{action_uid}")))
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            return response.json::<ActionRecord>().await.map_err(transport);
        }
        match rejection(response).await {
            (StatusCode::NOT_FOUND, _) => Err(StorageError::ActionNotFound {
                action_uid: action_uid.0.clone(),
            }),
            (status, reason) => Err(unexpected(status, reason)),
        }
    }

    async fn list_by_repo_for_user(
        &self,
        repo_name: &str,
        _user_id: &str,
    ) -> StorageResult<Vec<ActionRecord>> {
        Err(StorageError::Backend(format!(
            "listing {repo_name} needs the caller's token; use GET /api/v1/read-action/{repo_name}"
        )))
    }
}

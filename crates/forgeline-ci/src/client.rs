//! Stage Client: one outbound call per stage.
//!
//! [`StageClient::invoke`] reports a stage that cannot be reached as a
//! [`ClientError`]; the coordinator turns it into a stored `ERROR` and
//! keeps the sequence going.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forgeline_state::Stage;
use thiserror::Error;

use crate::executor::StageExecutor;
use crate::stage::{trigger_path, StageOutcome, StageRequest};

/// Transport failures between the coordinator and an executor.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {stage} executor failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    #[error("{stage} executor answered HTTP {status}")]
    Status { stage: Stage, status: u16 },

    #[error("no executor registered for {0}")]
    NoExecutor(Stage),
}

#[async_trait]
pub trait StageClient: Send + Sync {
    /// Call `stage` with `request` and return its result.
    async fn invoke(&self, stage: Stage, request: &StageRequest)
        -> Result<StageOutcome, ClientError>;
}

/// Base URLs of the four stage executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEndpoints {
    pub scanner: String,
    pub builder: String,
    pub tester: String,
    pub deployer: String,
}

impl Default for StageEndpoints {
    fn default() -> Self {
        Self {
            scanner: "http://scanner:5000".to_string(),
            builder: "http://builder:5000".to_string(),
            tester: "http://tester:5000".to_string(),
            deployer: "http://deployer:5000".to_string(),
        }
    }
}

impl StageEndpoints {
    pub fn base(&self, stage: Stage) -> &str {
        match stage {
            Stage::Scanner => &self.scanner,
            Stage::Builder => &self.builder,
            Stage::Tester => &self.tester,
            Stage::Deployer => &self.deployer,
        }
    }

    /// Full trigger URL, e.g. `http://scanner:5000/api/v1/trigger-scan`.
    pub fn url(&self, stage: Stage) -> String {
        format!(
            "{}{}",
            self.base(stage).trim_end_matches('/'),
            trigger_path(stage)
        )
    }
}

/// Calls remote executors over HTTP.
pub struct HttpStageClient {
    client: reqwest::Client,
    endpoints: StageEndpoints,
}

impl HttpStageClient {
    /// `request_timeout` of `None` waits for as long as the stage runs.
    pub fn new(endpoints: StageEndpoints, request_timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = request_timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &StageEndpoints {
        &self.endpoints
    }

}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn invoke(
        &self,
        stage: Stage,
        request: &StageRequest,
    ) -> Result<StageOutcome, ClientError> {
        let transport = |source| ClientError::Transport { stage, source };

        let response = self
            .client
            .post(self.endpoints.url(stage))
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                stage,
                status: response.status().as_u16(),
            });
        }
        response.json::<StageOutcome>().await.map_err(transport)
    }
}

/// Calls executors living in the same process.
#[derive(Default)]
pub struct LocalStageClient {
    executors: HashMap<Stage, Arc<StageExecutor>>,
}

impl LocalStageClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(mut self, executor: Arc<StageExecutor>) -> Self {
        self.executors.insert(executor.stage(), executor);
        self
    }
}

#[async_trait]
impl StageClient for LocalStageClient {
    async fn invoke(
        &self,
        stage: Stage,
        request: &StageRequest,
    ) -> Result<StageOutcome, ClientError> {
        let executor = self
            .executors
            .get(&stage)
            .ok_or(ClientError::NoExecutor(stage))?;
        Ok(executor.execute(request).await)
    }
}

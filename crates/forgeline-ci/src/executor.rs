//! Executor half of the stage contract.
//!
//! A [`StageExecutor`] receives the predecessor's result, runs its tool
//! only when that result is OK, streams tool output as log events, reports
//! its own status and ETA to the record store, and answers with
//! `{status, image_tag}`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use forgeline_core::{obs, LogPublisher, METRICS};
use forgeline_state::{ActionStore, ActionUid, Eta, LogEvent, Stage, StageStatus, StageUpdate};
use tokio::time::Instant;
use tracing::{debug, Instrument};

use crate::eta::format_elapsed;
use crate::stage::{default_image_tag, StageOutcome, StageRequest};

/// Line-oriented log handle for one stage of one action.
#[derive(Clone)]
pub struct StageLog {
    publisher: Arc<dyn LogPublisher>,
    action_uid: ActionUid,
    stage: Stage,
}

impl StageLog {
    pub fn new(publisher: Arc<dyn LogPublisher>, action_uid: ActionUid, stage: Stage) -> Self {
        Self {
            publisher,
            action_uid,
            stage,
        }
    }

    /// Publish one line of output, stamped now.
    pub fn line(&self, text: &str) {
        self.publisher.publish(LogEvent::now(
            self.action_uid.clone(),
            self.stage,
            text.trim_end_matches(['\r', '\n']),
        ));
    }
}

/// The work a stage actually does. Returns whether it succeeded.
#[async_trait]
pub trait StageTool: Send + Sync {
    async fn run(&self, request: &StageRequest, image_tag: &str, log: &StageLog) -> Result<bool>;
}

/// Where an executor writes its own status and ETA.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, action_uid: &ActionUid, update: &StageUpdate) -> Result<()>;
}

/// Reports into an [`ActionStore`]: a local one, or the store daemon through
/// [`HttpActionStore`](crate::HttpActionStore).
pub struct StoreStatusReporter {
    store: Arc<dyn ActionStore>,
}

impl StoreStatusReporter {
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StatusReporter for StoreStatusReporter {
    async fn report(&self, action_uid: &ActionUid, update: &StageUpdate) -> Result<()> {
        self.store.update_stage(action_uid, update).await?;
        Ok(())
    }
}

/// One stage's executor.
pub struct StageExecutor {
    stage: Stage,
    tool: Arc<dyn StageTool>,
    publisher: Arc<dyn LogPublisher>,
    reporter: Arc<dyn StatusReporter>,
}

impl StageExecutor {
    pub fn new(
        stage: Stage,
        tool: Arc<dyn StageTool>,
        publisher: Arc<dyn LogPublisher>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            stage,
            tool,
            publisher,
            reporter,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Handle one trigger. Never fails: tool errors become `ERROR`, report
    /// errors are logged and dropped.
    pub async fn execute(&self, request: &StageRequest) -> StageOutcome {
        let span = obs::action_span(request.action_uid.as_str());
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: &StageRequest) -> StageOutcome {
        let image_tag = match (self.stage, &request.image_tag) {
            (Stage::Builder, _) | (_, None) => default_image_tag(&request.repo_name),
            (_, Some(tag)) => tag.clone(),
        };

        let (status, eta) = if request.status.is_ok() {
            let log = StageLog::new(
                self.publisher.clone(),
                request.action_uid.clone(),
                self.stage,
            );
            let started = Instant::now();
            let status = match self.tool.run(request, &image_tag, &log).await {
                Ok(true) => StageStatus::Ok,
                Ok(false) => StageStatus::Error,
                Err(e) => {
                    log.line(&format!("{} failed: {e:#}", self.stage));
                    StageStatus::Error
                }
            };
            METRICS.inc_stages_executed();
            (status, Eta::Elapsed(format_elapsed(started.elapsed())))
        } else {
            debug!(stage = %self.stage, predecessor = %request.status, "predecessor not OK, skipping");
            (StageStatus::NotApplicable, Eta::NotApplicable)
        };

        let eta_text = eta.to_string();
        let update = StageUpdate::new(self.stage, status, eta);
        if let Err(e) = self.reporter.report(&request.action_uid, &update).await {
            obs::emit_status_report_failed(
                request.action_uid.as_str(),
                self.stage.service_name(),
                &format!("{e:#}"),
            );
        }
        obs::emit_stage_finished(
            request.action_uid.as_str(),
            self.stage.service_name(),
            status.as_str(),
            &eta_text,
        );

        StageOutcome {
            status,
            image_tag: Some(image_tag),
            eta: Some(eta_text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::OAuthToken;
    use std::sync::Mutex;

    struct FixedTool(Result<bool, &'static str>);

    #[async_trait]
    impl StageTool for FixedTool {
        async fn run(&self, _req: &StageRequest, image_tag: &str, log: &StageLog) -> Result<bool> {
            log.line(&format!("using {image_tag}\n"));
            self.0.map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<LogEvent>>);

    impl LogPublisher for Recorder {
        fn publish(&self, event: LogEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[derive(Default)]
    struct Reports(Mutex<Vec<StageUpdate>>);

    #[async_trait]
    impl StatusReporter for Reports {
        async fn report(&self, _uid: &ActionUid, update: &StageUpdate) -> Result<()> {
            self.0.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl StatusReporter for Unreachable {
        async fn report(&self, _uid: &ActionUid, _update: &StageUpdate) -> Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    fn request(status: StageStatus, image_tag: Option<&str>) -> StageRequest {
        StageRequest {
            repo_name: "Demo".to_string(),
            oauth_token: OAuthToken::from("tok"),
            jwt_token: "jwt".to_string(),
            action_uid: ActionUid::from("run-1"),
            username: "octo".to_string(),
            status,
            git_repo_url: String::new(),
            image_tag: image_tag.map(str::to_string),
        }
    }

    fn executor(
        stage: Stage,
        tool: FixedTool,
        logs: Arc<Recorder>,
        reporter: Arc<dyn StatusReporter>,
    ) -> StageExecutor {
        StageExecutor::new(stage, Arc::new(tool), logs, reporter)
    }

    #[tokio::test]
    async fn test_ok_predecessor_runs_tool_and_reports() {
        let logs = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let exec = executor(Stage::Builder, FixedTool(Ok(true)), logs.clone(), reports.clone());

        let outcome = exec.execute(&request(StageStatus::Ok, None)).await;
        assert_eq!(outcome.status, StageStatus::Ok);
        assert_eq!(outcome.image_tag.as_deref(), Some("demo_image:latest"));

        let reports = reports.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].stage, Stage::Builder);
        assert_eq!(reports[0].status, StageStatus::Ok);
        assert!(matches!(reports[0].eta, Eta::Elapsed(_)));

        let logs = logs.0.lock().unwrap();
        assert_eq!(logs[0].text, "using demo_image:latest");
        assert_eq!(logs[0].service, Stage::Builder);
    }

    #[tokio::test]
    async fn test_non_ok_predecessor_short_circuits() {
        let logs = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let exec = executor(Stage::Tester, FixedTool(Ok(true)), logs.clone(), reports.clone());

        let outcome = exec.execute(&request(StageStatus::Error, None)).await;
        assert_eq!(outcome.status, StageStatus::NotApplicable);
        assert_eq!(outcome.eta.as_deref(), Some("N/A"));
        assert!(logs.0.lock().unwrap().is_empty());

        let reports = reports.0.lock().unwrap();
        assert_eq!(reports[0].status, StageStatus::NotApplicable);
        assert_eq!(reports[0].eta, Eta::NotApplicable);
    }

    #[tokio::test]
    async fn test_tool_error_becomes_error_status() {
        let logs = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let exec = executor(
            Stage::Scanner,
            FixedTool(Err("spawn failed")),
            logs.clone(),
            reports.clone(),
        );

        let outcome = exec.execute(&request(StageStatus::Ok, None)).await;
        assert_eq!(outcome.status, StageStatus::Error);
        let logs = logs.0.lock().unwrap();
        assert!(logs.last().unwrap().text.contains("spawn failed"));
    }

    #[tokio::test]
    async fn test_deployer_keeps_received_tag() {
        let exec = executor(
            Stage::Deployer,
            FixedTool(Ok(true)),
            Arc::new(Recorder::default()),
            Arc::new(Reports::default()),
        );
        let outcome = exec
            .execute(&request(StageStatus::Ok, Some("custom:1.2")))
            .await;
        assert_eq!(outcome.image_tag.as_deref(), Some("custom:1.2"));
    }

    #[tokio::test]
    async fn test_failed_report_does_not_change_outcome() {
        let exec = executor(
            Stage::Scanner,
            FixedTool(Ok(false)),
            Arc::new(Recorder::default()),
            Arc::new(Unreachable),
        );
        let outcome = exec.execute(&request(StageStatus::Ok, None)).await;
        assert_eq!(outcome.status, StageStatus::Error);
    }
}

//! External command execution for stage executors.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::executor::{StageLog, StageTool};
use crate::stage::StageRequest;

/// Runs a configured program as a stage's tool.
///
/// Arguments may contain the placeholders `{image_tag}`, `{repo_url}`,
/// `{repo_name}` and `{action_uid}`. Every stdout and stderr line is
/// published as a log event. Exit code 0 is success.
#[derive(Debug, Clone)]
pub struct CommandTool {
    /// Command to execute (first element is executable).
    command: Vec<String>,

    /// Kill the program after this long.
    timeout: Option<Duration>,
}

impl CommandTool {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout: None,
        }
    }

    /// Split a command line on whitespace.
    pub fn parse(command_line: &str) -> Self {
        Self::new(command_line.split_whitespace().map(str::to_string).collect())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The command with placeholders filled in for one request.
    pub fn render(&self, request: &StageRequest, image_tag: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{image_tag}", image_tag)
                    .replace("{repo_url}", &request.git_repo_url)
                    .replace("{repo_name}", &request.repo_name)
                    .replace("{action_uid}", request.action_uid.as_str())
            })
            .collect()
    }

    async fn run_to_exit(&self, argv: &[String], log: &StageLog) -> Result<bool> {
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", argv[0]))?;

        let stdout = child.stdout.take().context("stdout not captured")?;
        let stderr = child.stderr.take().context("stderr not captured")?;

        let (out, err) = tokio::join!(pump(stdout, log), pump(stderr, log));
        out?;
        err?;

        let status = child.wait().await.context("waiting for stage command")?;
        debug!(code = ?status.code(), "stage command exited");
        Ok(status.success())
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: R, log: &StageLog) -> Result<()> {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await.context("reading command output")? {
        log.line(&line);
    }
    Ok(())
}

#[async_trait]
impl StageTool for CommandTool {
    async fn run(&self, request: &StageRequest, image_tag: &str, log: &StageLog) -> Result<bool> {
        if self.command.is_empty() {
            bail!("stage command is empty");
        }
        let argv = self.render(request, image_tag);
        info!(program = %argv[0], "running stage command");

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_to_exit(&argv, log))
                .await
                .map_err(|_| anyhow::anyhow!("stage command timed out after {:?}", limit))?,
            None => self.run_to_exit(&argv, log).await,
        }
    }
}

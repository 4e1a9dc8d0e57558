//! Command-line and environment configuration of the three roles.
//!
//! Every flag can also be set through its `FORGELINE_*` variable; a `.env`
//! file in the working directory is loaded first.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use forgeline_ci::StageEndpoints;
use forgeline_core::AggregatorConfig;
use forgeline_state::Stage;

#[derive(Debug, Parser)]
#[command(name = "forgelined")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forgeline CI/CD pipeline daemon", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "FORGELINE_VERBOSE")]
    pub verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true, env = "FORGELINE_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub role: Role,
}

#[derive(Debug, Subcommand)]
pub enum Role {
    /// Accept triggers and drive stage sequences
    Coordinator(CoordinatorArgs),

    /// Serve action records and aggregate stage logs
    Store(StoreArgs),

    /// Execute one pipeline stage
    Executor(ExecutorArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// SurrealDB URL (e.g. `mem://`, `surrealkv://path`, `ws://host:8000`).
    /// Falls back to SURREALDB_* cloud settings, then a local file.
    #[arg(long = "db", env = "FORGELINE_DB")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct CoordinatorArgs {
    #[arg(long, env = "FORGELINE_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// HS256 secret used to verify caller JWTs
    #[arg(long, env = "FORGELINE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Store daemon recording new runs
    #[arg(long, env = "FORGELINE_STORE_URL", default_value = "http://store:5000")]
    pub store_url: String,

    /// Timeout of calls to the store, in seconds
    #[arg(long, env = "FORGELINE_STORE_TIMEOUT_SECS", default_value_t = 10)]
    pub store_timeout_secs: u64,

    /// Maximum number of runs executing at once
    #[arg(long, env = "FORGELINE_WORKERS", default_value_t = 16)]
    pub workers: usize,

    #[arg(long, env = "FORGELINE_SCANNER_URL", default_value = "http://scanner:5000")]
    pub scanner_url: String,

    #[arg(long, env = "FORGELINE_BUILDER_URL", default_value = "http://builder:5000")]
    pub builder_url: String,

    #[arg(long, env = "FORGELINE_TESTER_URL", default_value = "http://tester:5000")]
    pub tester_url: String,

    #[arg(long, env = "FORGELINE_DEPLOYER_URL", default_value = "http://deployer:5000")]
    pub deployer_url: String,

    /// Per-call timeout towards executors, in seconds; unset waits forever
    #[arg(long, env = "FORGELINE_STAGE_TIMEOUT_SECS")]
    pub stage_timeout_secs: Option<u64>,

    #[arg(long, env = "FORGELINE_GITHUB_API", default_value = "https://api.github.com")]
    pub github_api: String,
}

impl CoordinatorArgs {
    pub fn endpoints(&self) -> StageEndpoints {
        StageEndpoints {
            scanner: self.scanner_url.clone(),
            builder: self.builder_url.clone(),
            tester: self.tester_url.clone(),
            deployer: self.deployer_url.clone(),
        }
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        store_timeout(self.store_timeout_secs)
    }
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[arg(long, env = "FORGELINE_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub db: DatabaseArgs,

    /// HS256 secret used to verify read-API JWTs
    #[arg(long, env = "FORGELINE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Flush once this many log events are buffered
    #[arg(long, env = "FORGELINE_BATCH_SIZE", default_value_t = 15)]
    pub batch_size: usize,

    /// Flush once the oldest buffered event is this old, in milliseconds
    #[arg(long, env = "FORGELINE_BATCH_TIMEOUT_MS", default_value_t = 3_000)]
    pub batch_timeout_ms: u64,

    /// Idle poll interval of the aggregator, in milliseconds
    #[arg(long, env = "FORGELINE_POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Events kept in memory while writes keep failing
    #[arg(long, env = "FORGELINE_MAX_BUFFERED", default_value_t = 10_000)]
    pub max_buffered: usize,
}

impl StoreArgs {
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            batch_size: self.batch_size.max(1),
            batch_timeout: Duration::from_millis(self.batch_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_buffered: self.max_buffered,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ExecutorArgs {
    #[arg(long, env = "FORGELINE_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Stage served by this executor (`scan`/`scanner`, `build`, ...)
    #[arg(long, env = "FORGELINE_STAGE", value_parser = parse_stage)]
    pub stage: Stage,

    /// Command line to run; `{image_tag}`, `{repo_url}`, `{repo_name}` and
    /// `{action_uid}` are substituted
    #[arg(long, env = "FORGELINE_COMMAND")]
    pub command: String,

    /// Kill the command after this many seconds
    #[arg(long, env = "FORGELINE_COMMAND_TIMEOUT_SECS")]
    pub command_timeout_secs: Option<u64>,

    /// Store daemon receiving status updates
    #[arg(long, env = "FORGELINE_STORE_URL", default_value = "http://store:5000")]
    pub store_url: String,

    /// Log ingest endpoint base; defaults to the store URL
    #[arg(long, env = "FORGELINE_LOG_URL")]
    pub log_url: Option<String>,

    /// Timeout of calls to the store, in seconds
    #[arg(long, env = "FORGELINE_STORE_TIMEOUT_SECS", default_value_t = 10)]
    pub store_timeout_secs: u64,
}

impl ExecutorArgs {
    pub fn log_url(&self) -> &str {
        self.log_url.as_deref().unwrap_or(&self.store_url)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        store_timeout(self.store_timeout_secs)
    }
}

/// Zero disables the timeout.
fn store_timeout(secs: u64) -> Option<Duration> {
    Some(Duration::from_secs(secs)).filter(|d| !d.is_zero())
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse().map_err(|e: forgeline_state::FieldError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_executor_args() {
        let cli = Cli::try_parse_from([
            "forgelined",
            "executor",
            "--stage",
            "builder",
            "--command",
            "docker build -t {image_tag} {repo_url}",
            "--store-url",
            "http://localhost:5001",
        ])
        .unwrap();
        let Role::Executor(args) = cli.role else {
            panic!("expected executor role");
        };
        assert_eq!(args.stage, Stage::Builder);
        assert_eq!(args.log_url(), "http://localhost:5001");
        assert_eq!(args.command_timeout(), None);
        assert_eq!(args.store_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let parsed = Cli::try_parse_from([
            "forgelined",
            "executor",
            "--stage",
            "lint",
            "--command",
            "true",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_store_aggregator_defaults() {
        let cli = Cli::try_parse_from([
            "forgelined",
            "store",
            "--jwt-secret",
            "s3cret",
            "--db",
            "mem://",
        ])
        .unwrap();
        let Role::Store(args) = cli.role else {
            panic!("expected store role");
        };
        assert_eq!(args.aggregator_config(), AggregatorConfig::default());
        assert_eq!(args.db.url.as_deref(), Some("mem://"));
    }

    #[test]
    fn test_coordinator_endpoints() {
        let cli = Cli::try_parse_from([
            "forgelined",
            "coordinator",
            "--jwt-secret",
            "s3cret",
            "--tester-url",
            "http://10.0.0.7:5000",
        ])
        .unwrap();
        let Role::Coordinator(args) = cli.role else {
            panic!("expected coordinator role");
        };
        let endpoints = args.endpoints();
        assert_eq!(endpoints.tester, "http://10.0.0.7:5000");
        assert_eq!(endpoints.scanner, StageEndpoints::default().scanner);
        assert_eq!(args.workers, 16);
        assert_eq!(args.stage_timeout(), None);
        assert_eq!(args.store_url, "http://store:5000");
    }

    #[test]
    fn test_coordinator_store_url() {
        let cli = Cli::try_parse_from([
            "forgelined",
            "coordinator",
            "--jwt-secret",
            "s3cret",
            "--store-url",
            "http://10.0.0.9:5000",
            "--store-timeout-secs",
            "0",
        ])
        .unwrap();
        let Role::Coordinator(args) = cli.role else {
            panic!("expected coordinator role");
        };
        assert_eq!(args.store_url, "http://10.0.0.9:5000");
        assert_eq!(args.store_timeout(), None);

        // the coordinator never opens the database itself
        let with_db = Cli::try_parse_from([
            "forgelined",
            "coordinator",
            "--jwt-secret",
            "s3cret",
            "--db",
            "mem://",
        ]);
        assert!(with_db.is_err());
    }
}

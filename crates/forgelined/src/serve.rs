//! Wiring and serving of each role.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use forgeline_ci::{
    CommandTool, Coordinator, GithubRepoProvider, HttpActionStore, HttpStageClient,
    StageExecutor, StoreStatusReporter, WorkerPool,
};
use forgeline_core::{log_channel, HttpLogPublisher, LogAggregator, METRICS};
use forgeline_state::SurrealStore;
use tokio::net::TcpListener;
use tracing::info;

use crate::auth::JwtVerifier;
use crate::config::{CoordinatorArgs, DatabaseArgs, ExecutorArgs, StoreArgs};
use crate::routes::coordinator::CoordinatorState;
use crate::routes::executor::ExecutorState;
use crate::routes::store::StoreState;
use crate::routes::{coordinator, executor, store};

const GITHUB_TIMEOUT: Duration = Duration::from_secs(10);

async fn open_store(db: &DatabaseArgs) -> Result<SurrealStore> {
    let store = match &db.url {
        Some(url) => SurrealStore::connect(url).await,
        None => SurrealStore::from_env().await,
    };
    store.context("connecting to SurrealDB")
}

pub async fn run_coordinator(args: CoordinatorArgs) -> Result<()> {
    let records = HttpActionStore::new(&args.store_url, args.store_timeout())?;
    let client = HttpStageClient::new(args.endpoints(), args.stage_timeout())?;
    let repos = GithubRepoProvider::with_api_base(&args.github_api, Some(GITHUB_TIMEOUT))?;
    let pipeline = Coordinator::new(
        Arc::new(records),
        Arc::new(client),
        Arc::new(repos),
        WorkerPool::new(args.workers),
    );

    let app = coordinator::router(CoordinatorState {
        coordinator: Arc::new(pipeline),
        verifier: Arc::new(JwtVerifier::new(&args.jwt_secret)),
    });
    info!(workers = args.workers, store = %args.store_url, "coordinator ready");
    serve(args.listen, app).await
}

pub async fn run_store(args: StoreArgs) -> Result<()> {
    let db = Arc::new(open_store(&args.db).await?);
    let aggregator = Arc::new(LogAggregator::new(db.clone(), args.aggregator_config()));

    let (publisher, rx) = log_channel();
    let drain = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.run(rx).await })
    };

    let app = store::router(StoreState {
        actions: db.clone(),
        logs: db,
        ingest: Arc::new(publisher),
        verifier: Arc::new(JwtVerifier::new(&args.jwt_secret)),
    });
    info!(batch_size = args.batch_size, "store ready");
    serve(args.listen, app).await?;

    // The router held the last publisher; the aggregator flushes and exits.
    drain.await.context("aggregator task")?;
    Ok(())
}

pub async fn run_executor(args: ExecutorArgs) -> Result<()> {
    let tool = CommandTool::parse(&args.command).with_timeout(args.command_timeout());
    let publisher = HttpLogPublisher::spawn(args.log_url(), args.store_timeout())?;
    let records = HttpActionStore::new(&args.store_url, args.store_timeout())?;
    let reporter = StoreStatusReporter::new(Arc::new(records));
    let executor = StageExecutor::new(
        args.stage,
        Arc::new(tool),
        Arc::new(publisher),
        Arc::new(reporter),
    );

    let app = executor::router(ExecutorState {
        executor: Arc::new(executor),
    });
    info!(stage = %args.stage, command = %args.command, "executor ready");
    serve(args.listen, app).await
}

async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;
    METRICS.flush();
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

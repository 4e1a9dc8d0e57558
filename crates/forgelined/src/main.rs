use anyhow::Result;
use clap::Parser;
use forgelined::{serve, Cli, Role};
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    forgeline_core::init_tracing(cli.json_logs, level);

    match cli.role {
        Role::Coordinator(args) => serve::run_coordinator(args).await,
        Role::Store(args) => serve::run_store(args).await,
        Role::Executor(args) => serve::run_executor(args).await,
    }
}

mod api;
mod cli;
mod config;
mod error;
mod metrics;
mod model;
mod orchestrator;
mod storage;
mod supervisor;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so stdout stays clean for tables and JSON.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(&args.log_level);
    let is_serve = matches!(args.command, cli::Command::Serve(_));

    cli::run(args).await?;
    // Restarted organs are detached children; exit without waiting on them.
    if !is_serve {
        std::process::exit(0);
    }
    Ok(())
}

//! Lead-score query server

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use leadscore_core::combiner::strategy_by_name;
use leadscore_server::{start_server, AppState};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "leadscore-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serves lead-conversion scores over HTTP", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "LEADSCORE_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Model artifact(s); one engine per path
    #[arg(long, env = "LEADSCORE_MODEL", value_delimiter = ',', required = true)]
    model: Vec<PathBuf>,

    /// How engine results are merged: first | mean
    #[arg(long, default_value = "first")]
    combine: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to set tracing subscriber: {err}"))?;

    let strategy = strategy_by_name(&args.combine)
        .ok_or_else(|| anyhow!("unknown combine strategy {:?}", args.combine))?;

    info!("Lead-score Query Server v{}", env!("CARGO_PKG_VERSION"));
    for path in &args.model {
        info!("  Model: {}", path.display());
    }
    info!("  Combine: {}", args.combine);

    let state = AppState::load(args.model, strategy).context("failed to load models")?;
    start_server(state, &args.bind).await
}

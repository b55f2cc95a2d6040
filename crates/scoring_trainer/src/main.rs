//! Lead-score trainer CLI
//!
//! Trains a forest from an event export and writes a verified artifact, or
//! scores a single query against a saved artifact.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use leadscore_core::{predict, read_events_jsonl, EventFilter, ModelArtifact, Query, MODEL_FILE};
use leadscore_trainer::{train_pipeline, CancelToken, TrainingConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "leadscore-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic lead-conversion forest trainer", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model from an event export
    Train {
        /// TOML training configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Event export (overrides [data] eventsPath)
        #[arg(long)]
        events: Option<PathBuf>,

        /// Output directory (overrides [output] directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Random seed (overrides config and LEADSCORE_SEED)
        #[arg(long)]
        seed: Option<i64>,

        /// Number of trees (overrides config and LEADSCORE_NUM_TREES)
        #[arg(long)]
        trees: Option<usize>,
    },

    /// Score one query against a saved model
    Predict {
        #[arg(short, long)]
        model: PathBuf,

        #[arg(long, default_value = "")]
        landing_page: String,

        #[arg(long, default_value = "")]
        referrer: String,

        #[arg(long, default_value = "")]
        browser: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Command::Train {
            config,
            events,
            output,
            seed,
            trees,
        } => train(config, events, output, seed, trees),
        Command::Predict {
            model,
            landing_page,
            referrer,
            browser,
        } => {
            let artifact = ModelArtifact::load_json(&model)
                .with_context(|| format!("Failed to load model {}", model.display()))?;
            let query = Query {
                landing_page_id: landing_page,
                referrer_id: referrer,
                browser,
            };
            let result = predict(&artifact, &query).context("Failed to score query")?;
            println!("{}", serde_json::to_string(&result)?);
            Ok(())
        }
    }
}

fn train(
    config_path: PathBuf,
    events: Option<PathBuf>,
    output: Option<PathBuf>,
    seed: Option<i64>,
    trees: Option<usize>,
) -> Result<()> {
    info!("Lead-score Forest Trainer v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════");

    let mut config = TrainingConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    if let Some(seed) = seed {
        config.forest.seed = Some(seed);
    }
    if let Some(trees) = trees {
        config.forest.num_trees = trees;
    }
    if let Some(output) = output {
        config.output.directory = output;
    }
    let Some(events_path) = events.or(config.data.events_path.clone()) else {
        bail!("No event source: pass --events or set [data] eventsPath");
    };

    info!("Loading events from: {}", events_path.display());
    let events = read_events_jsonl(&events_path, &EventFilter::sessions())
        .context("Failed to read events")?;

    info!("Training configuration:");
    info!("  Trees: {}", config.forest.num_trees);
    info!("  Feature subset: {:?}", config.forest.feature_subset_strategy);
    info!("  Max depth: {}", config.forest.max_depth);
    info!("  Max bins: {}", config.forest.max_bins);
    match config.forest.seed {
        Some(seed) => info!("  Seed: {}", seed),
        None => info!("  Seed: (generated)"),
    }

    info!("═══════════════════════════════════════════");
    info!("Starting training...");
    let artifact = train_pipeline(&events, config.forest, &CancelToken::new())?;

    let model_path = config.output.directory.join(MODEL_FILE);
    let hash_path = artifact
        .save_json(&model_path)
        .context("Failed to save model")?;

    info!("═══════════════════════════════════════════");
    info!("✓ Training completed successfully");
    info!("  Sessions: {}", artifact.metadata.training.session_count);
    info!("  Seed: {}", artifact.metadata.seed);
    info!("  Model: {}", model_path.display());
    info!("  Hash: {} ({})", hash_path.display(), artifact.model_hash());

    Ok(())
}

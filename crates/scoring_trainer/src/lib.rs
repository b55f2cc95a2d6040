//! Lead-score trainer - deterministic bagged regression forests
//!
//! Trains forests of CART regression trees with categorical subset splits
//! over reconstructed sessions, and packages them as verified artifacts.

pub mod cancel;
pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod pipeline;
pub mod trainer;

pub use cancel::CancelToken;
pub use config::{DataConfig, OutputConfig, TrainingConfig};
pub use dataset::Dataset;
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::{Result, TrainerError};
pub use pipeline::{train_pipeline, train_sessions};
pub use trainer::{FeatureSubsetStrategy, ForestParams, ForestTrainer, Impurity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use leadscore_core::CoreError;
use thiserror::Error;

/// Errors returned by the forest trainer and training pipeline.
#[derive(Debug, Error)]
pub enum TrainerError {
    /// Empty or degenerate training input; no model is produced
    #[error("training error: {0}")]
    Training(String),

    #[error("invalid hyperparameters: {0}")]
    InvalidParams(String),

    #[error("training cancelled after {trees_built} trees")]
    Cancelled { trees_built: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, TrainerError>;

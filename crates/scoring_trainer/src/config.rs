//! Training configuration
//!
//! A TOML file with `[data]`, `[forest]` and `[output]` tables. Values are
//! layered: file first, then `LEADSCORE_*` environment variables, then CLI
//! flags (applied by the binary).

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, TrainerError};
use crate::trainer::ForestParams;

pub const ENV_SEED: &str = "LEADSCORE_SEED";
pub const ENV_NUM_TREES: &str = "LEADSCORE_NUM_TREES";

const DEFAULT_OUTPUT_DIR: &str = "models/leadscore";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrainingConfig {
    #[serde(default)]
    pub data: DataConfig,
    pub forest: ForestParams,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where training events come from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DataConfig {
    /// Newline-delimited JSON event export
    pub events_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl TrainingConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TrainerError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load a config file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TrainerError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply `LEADSCORE_SEED` / `LEADSCORE_NUM_TREES` as resolved by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SEED) {
            let seed = raw
                .trim()
                .parse::<i64>()
                .map_err(|e| TrainerError::Config(format!("{ENV_SEED}={raw:?}: {e}")))?;
            self.forest.seed = Some(seed);
        }
        if let Some(raw) = lookup(ENV_NUM_TREES) {
            let num_trees = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| TrainerError::Config(format!("{ENV_NUM_TREES}={raw:?}: {e}")))?;
            self.forest.num_trees = num_trees;
        }
        Ok(())
    }
}

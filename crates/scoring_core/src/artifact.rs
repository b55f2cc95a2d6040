//! Model artifact packaging and verification
//!
//! The artifact bundles the forest with the exact feature index and
//! categorical map used to train it. It is written as canonical JSON with a
//! Blake3 digest of the `{ensemble, feature_index, categorical_map}` payload
//! recorded in its metadata and in a `.hash` sidecar file. Loading
//! recomputes the digest and rejects any mismatch, so serving can never
//! pair a forest with a different encoding than it was trained with.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::encoding::{CategoricalMap, DEFAULT_CATEGORY};
use crate::ensemble::{Forest, FORMAT_VERSION};
use crate::errors::{CoreError, Result};
use crate::features::FeatureIndex;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};

/// Default artifact file name inside an output directory
pub const MODEL_FILE: &str = "model.json";

/// Facts about the training run that produced an artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainingSummary {
    pub session_count: usize,
    pub training_rows: usize,
    /// Hyperparameters as supplied, rendered for display
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub format_version: i32,
    /// Blake3 hex digest of the canonical payload
    pub model_hash: String,
    /// Seed actually used by the trainer
    pub seed: i64,
    /// Unix timestamp (seconds) of assembly
    pub created_at: i64,
    pub training: TrainingSummary,
}

/// Borrowed view of the hashed part of an artifact
#[derive(Serialize)]
struct Payload<'a> {
    ensemble: &'a Forest,
    feature_index: &'a FeatureIndex,
    categorical_map: &'a CategoricalMap,
}

/// Immutable unit handed from training to serving
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub ensemble: Forest,
    pub feature_index: FeatureIndex,
    pub categorical_map: CategoricalMap,
}

impl ModelArtifact {
    /// Bundle trained parts, stamping hash, seed and creation time
    pub fn assemble(
        ensemble: Forest,
        feature_index: FeatureIndex,
        categorical_map: CategoricalMap,
        training: TrainingSummary,
    ) -> Result<Self> {
        let model_hash = payload_hash(&ensemble, &feature_index, &categorical_map)?;
        let metadata = ArtifactMetadata {
            format_version: FORMAT_VERSION,
            model_hash,
            seed: ensemble.seed,
            created_at: Utc::now().timestamp(),
            training,
        };

        let artifact = Self {
            metadata,
            ensemble,
            feature_index,
            categorical_map,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Recompute the payload digest
    pub fn compute_hash(&self) -> Result<String> {
        payload_hash(&self.ensemble, &self.feature_index, &self.categorical_map)
    }

    pub fn model_hash(&self) -> &str {
        &self.metadata.model_hash
    }

    /// Structural checks plus hash verification
    pub fn validate(&self) -> Result<()> {
        self.ensemble.validate()?;
        self.categorical_map.validate(DEFAULT_CATEGORY)?;

        if self.ensemble.feature_count != self.feature_index.len() {
            return Err(CoreError::InvalidInput(format!(
                "Forest expects {} features but the index has {}",
                self.ensemble.feature_count,
                self.feature_index.len()
            )));
        }

        let expected_arity = self.categorical_map.categorical_arity(&self.feature_index);
        if self.ensemble.categorical_arity != expected_arity {
            return Err(CoreError::InvalidInput(
                "Forest categorical arity disagrees with the categorical map".to_string(),
            ));
        }

        let actual = self.compute_hash()?;
        if actual != self.metadata.model_hash {
            return Err(CoreError::IntegrityMismatch {
                expected: self.metadata.model_hash.clone(),
                actual,
            });
        }

        Ok(())
    }

    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(to_canonical_json(self)?)
    }

    /// Write canonical JSON to `path` and the digest to its `.hash` sidecar
    #[instrument(skip(self), fields(hash = %self.metadata.model_hash))]
    pub fn save_json<P: AsRef<Path> + std::fmt::Debug>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = self.to_canonical_json()?;
        fs::write(path, &json)?;

        let hash_path = hash_sidecar(path);
        fs::write(&hash_path, &self.metadata.model_hash)?;

        info!(
            "Saved model artifact to {} ({} bytes, {} trees)",
            path.display(),
            json.len(),
            self.ensemble.num_trees()
        );
        Ok(hash_path)
    }

    /// Load and fully verify an artifact, including its sidecar if present
    #[instrument]
    pub fn load_json<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&json)?;
        artifact.validate()?;

        let hash_path = hash_sidecar(path);
        if hash_path.exists() {
            let recorded = fs::read_to_string(&hash_path)?;
            let recorded = recorded.trim();
            if recorded != artifact.metadata.model_hash {
                return Err(CoreError::IntegrityMismatch {
                    expected: recorded.to_string(),
                    actual: artifact.metadata.model_hash.clone(),
                });
            }
        } else {
            warn!("No hash sidecar next to {}", path.display());
        }

        info!(
            "Loaded model artifact {} (seed {}, {} trees)",
            artifact.metadata.model_hash,
            artifact.metadata.seed,
            artifact.ensemble.num_trees()
        );
        Ok(artifact)
    }
}

fn payload_hash(
    ensemble: &Forest,
    feature_index: &FeatureIndex,
    categorical_map: &CategoricalMap,
) -> Result<String> {
    Ok(hash_canonical_hex(&Payload {
        ensemble,
        feature_index,
        categorical_map,
    })?)
}

/// `model.json` → `model.hash`
pub fn hash_sidecar(path: &Path) -> PathBuf {
    path.with_extension("hash")
}

//! Bagged regression forest with averaged leaf outputs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::tree::{Split, Tree};
use super::SCALE;
use crate::errors::{CoreError, Result};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};

/// Serialized forest format version
pub const FORMAT_VERSION: i32 = 1;

/// Trained tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Forest {
    /// Model format version (always 1 for now)
    pub version: i32,

    /// Fixed-point scale of leaf values and thresholds
    pub scale: i64,

    /// Length of the feature vectors the forest was trained on
    pub feature_count: usize,

    /// Vector position → cardinality of each categorical feature
    pub categorical_arity: BTreeMap<usize, usize>,

    /// Seed actually used for bootstrap sampling and feature subsets
    pub seed: i64,

    pub trees: Vec<Tree>,
}

impl Forest {
    pub fn new(
        trees: Vec<Tree>,
        feature_count: usize,
        categorical_arity: BTreeMap<usize, usize>,
        seed: i64,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            scale: SCALE,
            feature_count,
            categorical_arity,
            seed,
            trees,
        }
    }

    /// Check structure and that every split agrees with the feature metadata
    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(CoreError::InvalidInput(format!(
                "Unsupported forest version: {}",
                self.version
            )));
        }
        if self.scale <= 0 {
            return Err(CoreError::InvalidInput(format!("Invalid scale: {}", self.scale)));
        }
        if self.trees.is_empty() {
            return Err(CoreError::InvalidInput("Forest has no trees".to_string()));
        }

        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| CoreError::InvalidInput(format!("Tree {t} validation failed: {e}")))?;

            for node in tree.nodes.iter().filter(|n| !n.is_leaf()) {
                let feature = node.feature_idx as usize;
                if feature >= self.feature_count {
                    return Err(CoreError::InvalidInput(format!(
                        "Tree {t} node {} splits on feature {feature} of {}",
                        node.id, self.feature_count
                    )));
                }
                let arity = self.categorical_arity.get(&feature);
                match (&node.split, arity) {
                    (Some(Split::Categorical { categories }), Some(&arity)) => {
                        if categories.iter().any(|&c| c as usize >= arity) {
                            return Err(CoreError::InvalidInput(format!(
                                "Tree {t} node {} uses a category outside arity {arity}",
                                node.id
                            )));
                        }
                    }
                    (Some(Split::Threshold { .. }), None) => {}
                    _ => {
                        return Err(CoreError::InvalidInput(format!(
                            "Tree {t} node {} split kind does not match feature {feature}",
                            node.id
                        )))
                    }
                }
            }
        }

        Ok(())
    }

    /// Sum of member-tree leaf outputs (fixed-point)
    fn leaf_sum(&self, features: &[f64]) -> i128 {
        self.trees
            .iter()
            .map(|tree| tree.evaluate(features) as i128)
            .sum()
    }

    /// Average of member-tree leaf outputs as a real-valued score
    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.leaf_sum(features) as f64 / (self.trees.len() as f64 * self.scale as f64)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(to_canonical_json(self)?)
    }

    pub fn hash_hex(&self) -> Result<String> {
        Ok(hash_canonical_hex(self)?)
    }
}

//! Training dataset built from labeled vectors
//!
//! Labels are converted to fixed-point targets once, up front; feature
//! values stay as supplied and are interpreted per feature kind by the
//! tree builder (category codes or quantized continuous values).

use leadscore_core::ensemble::{category_code, quantize};
use leadscore_core::LabeledVector;
use std::collections::BTreeMap;

use crate::errors::{Result, TrainerError};

/// Training rows with fixed-point targets
#[derive(Clone, Debug)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<i64>,
    pub feature_count: usize,
}

impl Dataset {
    /// Fails on empty input or vectors of differing length
    pub fn from_labeled(vectors: &[LabeledVector]) -> Result<Self> {
        let first = vectors
            .first()
            .ok_or_else(|| TrainerError::Training("no labeled vectors to train on".to_string()))?;
        let feature_count = first.features.len();
        if feature_count == 0 {
            return Err(TrainerError::Training("feature vectors are empty".to_string()));
        }

        let mut features = Vec::with_capacity(vectors.len());
        let mut targets = Vec::with_capacity(vectors.len());
        for (row, vector) in vectors.iter().enumerate() {
            if vector.features.len() != feature_count {
                return Err(TrainerError::Training(format!(
                    "row {row}: expected {feature_count} features, got {}",
                    vector.features.len()
                )));
            }
            if !vector.label.is_finite() || vector.features.iter().any(|v| !v.is_finite()) {
                return Err(TrainerError::Training(format!("row {row}: non-finite value")));
            }
            if !(0.0..=1.0).contains(&vector.label) {
                return Err(TrainerError::Training(format!(
                    "row {row}: label {} outside [0, 1]",
                    vector.label
                )));
            }
            features.push(vector.features.clone());
            targets.push(quantize(vector.label));
        }

        Ok(Self {
            features,
            targets,
            feature_count,
        })
    }

    /// Every declared arity must be positive, point at a real feature, and
    /// bound the codes actually present in that column.
    pub fn check_categorical(&self, arity: &BTreeMap<usize, usize>) -> Result<()> {
        for (&feature, &cardinality) in arity {
            if cardinality == 0 {
                return Err(TrainerError::Training(format!(
                    "categorical feature {feature} declares arity 0"
                )));
            }
            if feature >= self.feature_count {
                return Err(TrainerError::Training(format!(
                    "categorical feature {feature} is outside the {} feature vector",
                    self.feature_count
                )));
            }
            for (row, values) in self.features.iter().enumerate() {
                match category_code(values[feature]) {
                    Some(code) if (code as usize) < cardinality => {}
                    _ => {
                        return Err(TrainerError::Training(format!(
                            "row {row}: feature {feature} value {} is not a code below {cardinality}",
                            values[feature]
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of rows with a positive target
    pub fn positives(&self) -> usize {
        self.targets.iter().filter(|&&t| t > 0).count()
    }
}

//! Combination of per-engine results into the served answer

use crate::errors::{CoreError, Result};
use crate::types::PredictedResult;

/// Strategy for merging one or more engine results
pub trait CombineStrategy: Send + Sync {
    fn combine(&self, results: &[PredictedResult]) -> Result<PredictedResult>;

    fn name(&self) -> &'static str;
}

/// Returns the first result unchanged (single-model deployments)
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstResult;

impl CombineStrategy for FirstResult {
    fn combine(&self, results: &[PredictedResult]) -> Result<PredictedResult> {
        results
            .first()
            .copied()
            .ok_or_else(|| CoreError::Combine("no results to combine".to_string()))
    }

    fn name(&self) -> &'static str {
        "first"
    }
}

/// Arithmetic mean of all scores
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanScore;

impl CombineStrategy for MeanScore {
    fn combine(&self, results: &[PredictedResult]) -> Result<PredictedResult> {
        if results.is_empty() {
            return Err(CoreError::Combine("no results to combine".to_string()));
        }
        let total: f64 = results.iter().map(|r| r.score).sum();
        Ok(PredictedResult {
            score: total / results.len() as f64,
        })
    }

    fn name(&self) -> &'static str {
        "mean"
    }
}

/// Combine with the default (first-result) policy
pub fn combine(results: &[PredictedResult]) -> Result<PredictedResult> {
    FirstResult.combine(results)
}

/// Look up a strategy by configuration name
pub fn strategy_by_name(name: &str) -> Option<Box<dyn CombineStrategy>> {
    match name {
        "first" => Some(Box::new(FirstResult)),
        "mean" => Some(Box::new(MeanScore)),
        _ => None,
    }
}

//! Per-query scoring against a trained artifact
//!
//! Queries are encoded with the artifact's own feature index and
//! categorical map, read-only. Unseen categorical values resolve to the
//! default code rather than failing.

use tracing::debug;

use crate::artifact::ModelArtifact;
use crate::errors::Result;
use crate::features::{vectorize, FeatureSource};
use crate::types::{PredictedResult, Query};

/// Score a single query
pub fn predict(artifact: &ModelArtifact, query: &Query) -> Result<PredictedResult> {
    predict_source(artifact, query)
}

/// Score anything that exposes the artifact's features
pub fn predict_source<S: FeatureSource + ?Sized>(
    artifact: &ModelArtifact,
    source: &S,
) -> Result<PredictedResult> {
    let features = vectorize(source, &artifact.categorical_map, &artifact.feature_index)?;
    let score = artifact.ensemble.predict(&features);
    debug!(?features, score, "scored query");
    Ok(PredictedResult { score })
}

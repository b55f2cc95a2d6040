//! End-to-end training: events → sessions → encoded vectors → forest → artifact

use leadscore_core::{
    labeled_vectors, reconstruct, CategoricalMap, Event, FeatureIndex, ModelArtifact, Session,
    TrainingSummary, DEFAULT_CATEGORY,
};
use tracing::{info, instrument};

use crate::cancel::CancelToken;
use crate::errors::Result;
use crate::trainer::{ForestParams, ForestTrainer};

/// Reconstruct sessions from a filtered event stream and train on them
#[instrument(skip_all, fields(events = events.len()))]
pub fn train_pipeline(
    events: &[Event],
    params: ForestParams,
    cancel: &CancelToken,
) -> Result<ModelArtifact> {
    let sessions = reconstruct(events)?;
    info!(
        "Reconstructed {} sessions ({} converted) from {} events",
        sessions.len(),
        sessions.iter().filter(|s| s.converted).count(),
        events.len()
    );
    train_sessions(&sessions, &FeatureIndex::lead_defaults(), params, cancel)
}

/// Fit the categorical map, vectorize and train.
///
/// One default row per label is appended first so the empty value has a
/// code for every feature and both labels are present.
pub fn train_sessions(
    sessions: &[Session],
    feature_index: &FeatureIndex,
    params: ForestParams,
    cancel: &CancelToken,
) -> Result<ModelArtifact> {
    let mut rows = sessions.to_vec();
    rows.extend(Session::default_rows());

    let categorical_map = CategoricalMap::fit_sessions(&rows, feature_index, DEFAULT_CATEGORY);
    let arity = categorical_map.categorical_arity(feature_index);
    for (position, cardinality) in &arity {
        info!(
            "  Feature {} ({}): {} categories",
            position,
            feature_index.names()[*position],
            cardinality
        );
    }

    let vectors = labeled_vectors(&rows, &categorical_map, feature_index)?;

    let trainer = ForestTrainer::new(params)?;
    let forest = trainer.train(&vectors, &arity, cancel)?;
    info!("Seed used: {}", forest.seed);

    let summary = TrainingSummary {
        session_count: sessions.len(),
        training_rows: vectors.len(),
        parameters: trainer.params().describe(forest.seed),
    };
    let artifact =
        ModelArtifact::assemble(forest, feature_index.clone(), categorical_map, summary)?;
    info!("Model hash: {}", artifact.model_hash());
    Ok(artifact)
}

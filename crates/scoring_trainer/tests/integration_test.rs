//! Integration tests for the forest trainer and training pipeline
//!
//! Ensures identical artifacts are produced across runs with the same seed
//! and that trained artifacts score serving queries end to end.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use leadscore_core::{predict, CoreError, Event, LabeledVector, ModelArtifact, Query, MODEL_FILE};
use leadscore_trainer::{
    train_pipeline, CancelToken, FeatureSubsetStrategy, ForestParams, ForestTrainer, Impurity,
    TrainerError,
};
use serde_json::{json, Map};
use std::collections::BTreeMap;
use tempfile::TempDir;

const BROWSERS: [&str; 3] = ["Chrome", "Firefox", "Safari"];

fn event(
    name: &str,
    target_type: &str,
    target: &str,
    props: Map<String, serde_json::Value>,
    t: i64,
) -> Event {
    Event {
        event_id: None,
        entity_type: "user".into(),
        entity_id: "u".into(),
        event_name: name.into(),
        target_entity_type: Some(target_type.into()),
        target_entity_id: Some(target.into()),
        properties: props,
        event_time: Utc.timestamp_opt(t, 0).unwrap(),
    }
}

/// 60 sessions over four pages; landings on P1 and P3 convert
fn synthetic_events() -> Vec<Event> {
    let mut events = Vec::new();
    for i in 0..60i64 {
        let session = format!("S{i:03}");
        let page = format!("P{}", i % 4);
        let mut props = Map::new();
        props.insert("sessionId".into(), json!(session));
        props.insert("referrerId".into(), json!(format!("R{}", i % 3)));
        props.insert("browser".into(), json!(BROWSERS[(i % 5 % 3) as usize]));
        events.push(event("view", "page", &page, props, 1_000 + i * 100));

        if i % 2 == 1 {
            let mut props = Map::new();
            props.insert("sessionId".into(), json!(session));
            events.push(event("buy", "item", "I1", props, 1_050 + i * 100));
        }
    }
    events
}

fn params(num_trees: usize, seed: Option<i64>) -> ForestParams {
    ForestParams {
        num_trees,
        feature_subset_strategy: FeatureSubsetStrategy::Auto,
        impurity: Impurity::Variance,
        max_depth: 5,
        max_bins: 32,
        seed,
    }
}

fn query(page: &str, referrer: &str, browser: &str) -> Query {
    Query {
        landing_page_id: page.into(),
        referrer_id: referrer.into(),
        browser: browser.into(),
    }
}

#[test]
fn test_deterministic_training() -> Result<()> {
    let events = synthetic_events();

    let first = train_pipeline(&events, params(8, Some(42)), &CancelToken::new())?;
    let second = train_pipeline(&events, params(8, Some(42)), &CancelToken::new())?;

    assert_eq!(first.ensemble, second.ensemble);
    assert_eq!(first.categorical_map, second.categorical_map);
    assert_eq!(first.model_hash(), second.model_hash());
    assert_eq!(
        first.ensemble.to_canonical_json()?,
        second.ensemble.to_canonical_json()?
    );
    assert_eq!(first.metadata.training.session_count, 60);
    assert_eq!(first.metadata.training.training_rows, 62);
    Ok(())
}

#[test]
fn test_single_tree_learns_converting_pages() -> Result<()> {
    let artifact = train_pipeline(&synthetic_events(), params(1, Some(1)), &CancelToken::new())?;

    let converting = predict(&artifact, &query("P1", "R1", "Firefox"))?;
    let bouncing = predict(&artifact, &query("P0", "R0", "Chrome"))?;
    assert!(converting.score > 0.9, "P1 scored {}", converting.score);
    assert!(bouncing.score < 0.1, "P0 scored {}", bouncing.score);
    Ok(())
}

#[test]
fn test_unseen_page_scores_finite() -> Result<()> {
    let artifact = train_pipeline(&synthetic_events(), params(10, Some(3)), &CancelToken::new())?;

    let result = predict(&artifact, &query("unseen_page", "", "Firefox"))?;
    assert!(result.score.is_finite());
    assert!((0.0..=1.0).contains(&result.score));
    Ok(())
}

#[test]
fn test_generated_seed_is_recorded_and_reproducible() -> Result<()> {
    let events = synthetic_events();
    let generated = train_pipeline(&events, params(4, None), &CancelToken::new())?;

    let seed = generated.metadata.seed;
    assert_eq!(generated.ensemble.seed, seed);
    assert_eq!(generated.metadata.training.parameters["seed"], seed.to_string());

    let replayed = train_pipeline(&events, params(4, Some(seed)), &CancelToken::new())?;
    assert_eq!(replayed.model_hash(), generated.model_hash());
    Ok(())
}

#[test]
fn test_saved_artifact_scores_identically() -> Result<()> {
    let artifact = train_pipeline(&synthetic_events(), params(6, Some(11)), &CancelToken::new())?;
    let dir = TempDir::new()?;
    let path = dir.path().join(MODEL_FILE);
    artifact.save_json(&path)?;

    let loaded = ModelArtifact::load_json(&path)?;
    assert_eq!(loaded.model_hash(), artifact.model_hash());
    for q in [query("P1", "R2", "Safari"), query("P2", "", ""), query("nope", "x", "y")] {
        assert_eq!(predict(&loaded, &q)?, predict(&artifact, &q)?);
    }

    std::fs::write(dir.path().join("model.hash"), "0".repeat(64))?;
    assert!(matches!(
        ModelArtifact::load_json(&path),
        Err(CoreError::IntegrityMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_cancelled_run_yields_no_model() {
    let cancel = CancelToken::new();
    cancel.cancel();

    match train_pipeline(&synthetic_events(), params(5, Some(1)), &cancel) {
        Err(TrainerError::Cancelled { trees_built }) => assert_eq!(trees_built, 0),
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[test]
fn test_empty_vectors_and_zero_arity_fail() -> Result<()> {
    let trainer = ForestTrainer::new(params(2, Some(1)))?;
    let cancel = CancelToken::new();

    assert!(matches!(
        trainer.train(&[], &BTreeMap::new(), &cancel),
        Err(TrainerError::Training(_))
    ));

    let vectors = vec![
        LabeledVector { label: 1.0, features: vec![0.0] },
        LabeledVector { label: 0.0, features: vec![0.0] },
    ];
    assert!(matches!(
        trainer.train(&vectors, &BTreeMap::from([(0, 0)]), &cancel),
        Err(TrainerError::Training(_))
    ));
    Ok(())
}

#[test]
fn test_missing_session_id_surfaces_core_error() {
    let mut events = synthetic_events();
    events[0].properties.remove("sessionId");

    assert!(matches!(
        train_pipeline(&events, params(2, Some(1)), &CancelToken::new()),
        Err(TrainerError::Core(CoreError::MissingField { .. }))
    ));
}

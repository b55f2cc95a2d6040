//! Shared, swappable handle to the active model artifact
//!
//! Readers take an `Arc` snapshot and score against it without holding any
//! lock. Updates replace the whole artifact in one reference swap, so a
//! reader sees either the old or the new model, never a mix.

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifact::ModelArtifact;
use crate::combiner::{CombineStrategy, FirstResult};
use crate::errors::Result;
use crate::scorer;
use crate::types::{PredictedResult, Query};

#[derive(Debug)]
pub struct ModelHandle {
    current: RwLock<Arc<ModelArtifact>>,
}

impl ModelHandle {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self {
            current: RwLock::new(Arc::new(artifact)),
        }
    }

    /// Snapshot of the active artifact
    pub fn current(&self) -> Arc<ModelArtifact> {
        self.current.read().clone()
    }

    /// Install `artifact`, returning the one it replaced
    pub fn replace(&self, artifact: ModelArtifact) -> Arc<ModelArtifact> {
        let next = Arc::new(artifact);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        info!(
            "Model swapped {} -> {}",
            previous.model_hash(),
            self.current().model_hash()
        );
        previous
    }

    /// Load and verify an artifact, then swap it in. On failure the active
    /// model is left untouched.
    pub fn reload_from<P: AsRef<Path> + std::fmt::Debug>(
        &self,
        path: P,
    ) -> Result<Arc<ModelArtifact>> {
        match ModelArtifact::load_json(&path) {
            Ok(artifact) => {
                self.replace(artifact);
                Ok(self.current())
            }
            Err(err) => {
                warn!("Reload from {:?} failed, keeping active model: {}", path, err);
                Err(err)
            }
        }
    }

    pub fn predict(&self, query: &Query) -> Result<PredictedResult> {
        scorer::predict(&self.current(), query)
    }
}

/// Scores a query against every engine and merges the results
pub struct Engines {
    handles: Vec<Arc<ModelHandle>>,
    strategy: Box<dyn CombineStrategy>,
}

impl Engines {
    /// Single-engine deployment with the first-result policy
    pub fn single(handle: Arc<ModelHandle>) -> Self {
        Self::new(vec![handle], Box::new(FirstResult))
    }

    pub fn new(handles: Vec<Arc<ModelHandle>>, strategy: Box<dyn CombineStrategy>) -> Self {
        Self { handles, strategy }
    }

    pub fn handles(&self) -> &[Arc<ModelHandle>] {
        &self.handles
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn predict(&self, query: &Query) -> Result<PredictedResult> {
        let results = self
            .handles
            .iter()
            .map(|handle| handle.predict(query))
            .collect::<Result<Vec<_>>>()?;
        self.strategy.combine(&results)
    }
}

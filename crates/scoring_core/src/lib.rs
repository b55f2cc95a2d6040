//! Lead-conversion scoring core
//!
//! Reconstructs sessions from behavioral events, encodes their categorical
//! attributes, and evaluates trained regression-tree ensembles to score
//! the conversion likelihood of a landing.
//!
//! Modules:
//! - `sessions`: Join of view/buy events into per-session records
//! - `encoding`: Stable string → code maps with default-value fallback
//! - `features`: Feature index and vectorization of sessions and queries
//! - `ensemble`: Fixed-point regression trees and the averaged forest
//! - `artifact`: Model packaging, canonical persistence and verification
//! - `scorer`: Query scoring against an artifact
//! - `combiner`: Pluggable merging of multiple engine results
//! - `serving`: Atomically swappable model handle
//! - `datasource`: Event filtering and JSON-lines export reading

pub mod artifact;
pub mod combiner;
pub mod datasource;
pub mod encoding;
pub mod ensemble;
pub mod errors;
pub mod features;
pub mod scorer;
pub mod serde_canon;
pub mod serving;
pub mod sessions;
pub mod types;

pub use artifact::{ArtifactMetadata, ModelArtifact, TrainingSummary, MODEL_FILE};
pub use combiner::{combine, CombineStrategy, FirstResult, MeanScore};
pub use datasource::{read_events_jsonl, EventFilter};
pub use encoding::{CategoricalMap, CategoryCodes, DEFAULT_CATEGORY};
pub use ensemble::{Forest, Node, Split, Tree, SCALE};
pub use errors::{CoreError, Result};
pub use features::{label, labeled_vectors, vectorize, FeatureIndex, FeatureSource, FeatureVector};
pub use scorer::predict;
pub use serving::{Engines, ModelHandle};
pub use sessions::reconstruct;
pub use types::{Event, LabeledVector, PredictedResult, Query, Session};

/// Crate version string for artifact metadata and health reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

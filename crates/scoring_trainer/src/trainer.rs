//! Bagged regression-forest trainer
//!
//! Grows `num_trees` CART regression trees with variance-reduction splits
//! and averages their leaf outputs at prediction time. With more than one
//! tree each fit sees a bootstrap sample; every node considers a random
//! feature subset sized by the configured strategy. All randomness derives
//! from a single seed, so a fixed seed and input order reproduce the forest
//! exactly, independent of thread scheduling.

use leadscore_core::ensemble::{Forest, Tree};
use leadscore_core::LabeledVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, instrument};

use crate::cancel::CancelToken;
use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::{tree_seed, LcgRng};
use crate::errors::{Result, TrainerError};

/// Each child of a split keeps at least one row
const MIN_SAMPLES_LEAF: usize = 1;

/// How many features each node may split on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSubsetStrategy {
    All,
    Sqrt,
    Log2,
    #[serde(alias = "oneThird")]
    OneThird,
    /// `all` for a single tree, `onethird` for a forest
    Auto,
}

impl FeatureSubsetStrategy {
    /// Features sampled per node, always within `1..=feature_count`
    pub fn features_per_node(self, feature_count: usize, num_trees: usize) -> usize {
        let n = feature_count.max(1);
        let k = match self {
            Self::All => n,
            Self::Sqrt => ceil_sqrt(n),
            Self::Log2 => n.next_power_of_two().trailing_zeros() as usize,
            Self::OneThird => n.div_ceil(3),
            Self::Auto if num_trees == 1 => n,
            Self::Auto => n.div_ceil(3),
        };
        k.clamp(1, n)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Sqrt => "sqrt",
            Self::Log2 => "log2",
            Self::OneThird => "onethird",
            Self::Auto => "auto",
        }
    }
}

fn ceil_sqrt(n: usize) -> usize {
    let mut k = 1;
    while k * k < n {
        k += 1;
    }
    k
}

/// Split impurity measure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impurity {
    Variance,
}

/// Forest hyperparameters; every field but `seed` must be given explicitly
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForestParams {
    pub num_trees: usize,
    pub feature_subset_strategy: FeatureSubsetStrategy,
    pub impurity: Impurity,
    pub max_depth: usize,
    pub max_bins: usize,
    /// Generated and recorded in the forest when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(TrainerError::InvalidParams("numTrees must be positive".to_string()));
        }
        if self.max_depth == 0 {
            return Err(TrainerError::InvalidParams("maxDepth must be positive".to_string()));
        }
        if self.max_bins < 2 {
            return Err(TrainerError::InvalidParams(format!(
                "maxBins must be at least 2, got {}",
                self.max_bins
            )));
        }
        Ok(())
    }

    /// Hyperparameters as recorded in artifact metadata
    pub fn describe(&self, seed: i64) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("numTrees".to_string(), self.num_trees.to_string()),
            (
                "featureSubsetStrategy".to_string(),
                self.feature_subset_strategy.as_str().to_string(),
            ),
            ("impurity".to_string(), "variance".to_string()),
            ("maxDepth".to_string(), self.max_depth.to_string()),
            ("maxBins".to_string(), self.max_bins.to_string()),
            ("seed".to_string(), seed.to_string()),
        ])
    }
}

/// Forest trainer
pub struct ForestTrainer {
    params: ForestParams,
}

impl ForestTrainer {
    pub fn new(params: ForestParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Train a forest on `vectors`.
    ///
    /// `categorical_arity` maps vector positions to cardinalities; those
    /// features are split by category subsets, all others by threshold.
    #[instrument(skip_all, fields(rows = vectors.len(), trees = self.params.num_trees))]
    pub fn train(
        &self,
        vectors: &[LabeledVector],
        categorical_arity: &BTreeMap<usize, usize>,
        cancel: &CancelToken,
    ) -> Result<Forest> {
        let dataset = Dataset::from_labeled(vectors)?;
        dataset.check_categorical(categorical_arity)?;

        let seed = match self.params.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<i64>();
                info!(seed, "No seed supplied, generated one");
                seed
            }
        };

        let features_per_node = self
            .params
            .feature_subset_strategy
            .features_per_node(dataset.feature_count, self.params.num_trees);
        let builder = CartBuilder::new(
            &dataset,
            categorical_arity,
            TreeConfig {
                max_depth: self.params.max_depth,
                min_samples_leaf: MIN_SAMPLES_LEAF,
                max_bins: self.params.max_bins,
                features_per_node,
            },
        );

        info!(
            "Training {} trees on {} rows ({} positive), {} of {} features per node",
            self.params.num_trees,
            dataset.len(),
            dataset.positives(),
            features_per_node,
            dataset.feature_count
        );

        let built = AtomicUsize::new(0);
        let fitted: Vec<Option<Tree>> = (0..self.params.num_trees)
            .into_par_iter()
            .map(|tree_idx| {
                if cancel.is_cancelled() {
                    return None;
                }
                let tree = self.fit_tree(&builder, dataset.len(), seed, tree_idx);
                built.fetch_add(1, Ordering::Relaxed);
                Some(tree)
            })
            .collect();

        let Some(trees) = fitted.into_iter().collect::<Option<Vec<Tree>>>() else {
            let trees_built = built.load(Ordering::Relaxed);
            info!(trees_built, "Training cancelled");
            return Err(TrainerError::Cancelled { trees_built });
        };

        let forest = Forest::new(trees, dataset.feature_count, categorical_arity.clone(), seed);
        forest.validate()?;

        info!(
            "Trained {} trees (max depth {})",
            forest.num_trees(),
            forest.trees.iter().map(Tree::depth).max().unwrap_or(0)
        );
        Ok(forest)
    }

    fn fit_tree(
        &self,
        builder: &CartBuilder<'_>,
        n_rows: usize,
        seed: i64,
        tree_idx: usize,
    ) -> Tree {
        let mut rng = LcgRng::new(tree_seed(seed, tree_idx));
        let indices: Vec<usize> = if self.params.num_trees > 1 {
            rng.bootstrap(n_rows)
        } else {
            (0..n_rows).collect()
        };
        let tree = builder.build(&indices, &mut rng);
        debug!(tree = tree_idx, nodes = tree.nodes.len(), "fitted tree");
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ForestParams {
        ForestParams {
            num_trees: 4,
            feature_subset_strategy: FeatureSubsetStrategy::Auto,
            impurity: Impurity::Variance,
            max_depth: 4,
            max_bins: 32,
            seed: Some(7),
        }
    }

    #[test]
    fn test_features_per_node() {
        use FeatureSubsetStrategy::*;
        assert_eq!(All.features_per_node(10, 5), 10);
        assert_eq!(Sqrt.features_per_node(10, 5), 4);
        assert_eq!(Sqrt.features_per_node(9, 5), 3);
        assert_eq!(Log2.features_per_node(10, 5), 4);
        assert_eq!(Log2.features_per_node(1, 5), 1);
        assert_eq!(OneThird.features_per_node(10, 5), 4);
        assert_eq!(OneThird.features_per_node(3, 5), 1);
        assert_eq!(Auto.features_per_node(3, 1), 3);
        assert_eq!(Auto.features_per_node(3, 20), 1);
    }

    #[test]
    fn test_validate_rejects_degenerate_params() {
        assert!(params().validate().is_ok());

        let cases = [
            ForestParams { num_trees: 0, ..params() },
            ForestParams { max_depth: 0, ..params() },
            ForestParams { max_bins: 1, ..params() },
        ];
        for case in cases {
            assert!(matches!(
                ForestTrainer::new(case),
                Err(TrainerError::InvalidParams(_))
            ));
        }
    }

    #[test]
    fn test_params_use_camel_case_keys() {
        let json = r#"{
            "numTrees": 10,
            "featureSubsetStrategy": "oneThird",
            "impurity": "variance",
            "maxDepth": 5,
            "maxBins": 16
        }"#;
        let parsed: ForestParams = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.num_trees, 10);
        assert_eq!(parsed.feature_subset_strategy, FeatureSubsetStrategy::OneThird);
        assert_eq!(parsed.seed, None);
    }

    #[test]
    fn test_params_have_no_hidden_defaults() {
        let missing_bins = r#"{
            "numTrees": 10,
            "featureSubsetStrategy": "all",
            "impurity": "variance",
            "maxDepth": 5
        }"#;
        assert!(serde_json::from_str::<ForestParams>(missing_bins).is_err());

        let unknown = r#"{
            "numTrees": 10,
            "featureSubsetStrategy": "all",
            "impurity": "gini",
            "maxDepth": 5,
            "maxBins": 16
        }"#;
        assert!(serde_json::from_str::<ForestParams>(unknown).is_err());
    }

    #[test]
    fn test_params_accept_exactly_the_documented_keys() {
        let documented = r#"{"numTrees":5,"featureSubsetStrategy":"auto","impurity":"variance","maxDepth":4,"maxBins":32,"seed":3}"#;
        let parsed: ForestParams = serde_json::from_str(documented).unwrap();
        assert_eq!(parsed.max_depth, 4);
        assert_eq!(parsed.seed, Some(3));

        let extra = r#"{"numTrees":5,"featureSubsetStrategy":"auto","impurity":"variance","maxDepth":4,"maxBins":32,"minInstancesPerNode":2}"#;
        assert!(serde_json::from_str::<ForestParams>(extra).is_err());
    }

    #[test]
    fn test_describe_records_seed() {
        let described = params().describe(99);
        assert_eq!(described["seed"], "99");
        assert_eq!(described["featureSubsetStrategy"], "auto");
        assert_eq!(described.len(), 6);
    }

    #[test]
    fn test_huge_labels_fail_instead_of_overflowing() {
        let vectors: Vec<LabeledVector> = (0..4)
            .map(|i| LabeledVector {
                label: if i % 2 == 0 { 1e13 } else { 0.0 },
                features: vec![(i % 2) as f64],
            })
            .collect();
        let trainer = ForestTrainer::new(params()).unwrap();
        assert!(matches!(
            trainer.train(&vectors, &BTreeMap::from([(0, 2)]), &CancelToken::new()),
            Err(TrainerError::Training(_))
        ));
    }

    #[test]
    fn test_single_tree_uses_all_rows() {
        let vectors: Vec<LabeledVector> = (0..6)
            .map(|i| LabeledVector {
                label: if i < 3 { 0.0 } else { 1.0 },
                features: vec![if i < 3 { 0.0 } else { 1.0 }],
            })
            .collect();
        let trainer = ForestTrainer::new(ForestParams { num_trees: 1, ..params() }).unwrap();
        let forest = trainer
            .train(&vectors, &BTreeMap::from([(0, 2)]), &CancelToken::new())
            .unwrap();

        assert_eq!(forest.num_trees(), 1);
        assert_eq!(forest.predict(&[0.0]), 0.0);
        assert_eq!(forest.predict(&[1.0]), 1.0);
    }
}

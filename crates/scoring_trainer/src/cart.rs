//! CART (Classification and Regression Tree) builder
//!
//! Grows a single regression tree by variance reduction with integer-only
//! split scoring. Categorical features are split by partitioning their
//! categories into two subsets: the categories present in a node are
//! binned, ordered by mean target, and every prefix of that ordering is
//! evaluated as the left subset. For squared error this finds the optimal
//! binary partition without treating codes as magnitudes. Continuous
//! features fall back to threshold splits.

use leadscore_core::ensemble::{category_code, quantize, Node, Split, Tree};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::dataset::Dataset;
use crate::deterministic::{LcgRng, SplitTieBreaker};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Upper bound on category bins (and threshold candidates + 1) per split
    pub max_bins: usize,
    /// Features considered at each node
    pub features_per_node: usize,
}

/// Count and fixed-point target sum of a group of samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Stats {
    count: i64,
    sum: i128,
}

impl Stats {
    fn add(&mut self, target: i64) {
        self.count += 1;
        self.sum += target as i128;
    }

    fn merge(&mut self, other: Stats) {
        self.count += other.count;
        self.sum += other.sum;
    }

    fn minus(self, other: Stats) -> Stats {
        Stats {
            count: self.count - other.count,
            sum: self.sum - other.sum,
        }
    }

    /// S²/n; the variance reduction of a split is
    /// score(left) + score(right) - score(parent)
    fn score(&self) -> i128 {
        if self.count == 0 {
            return 0;
        }
        self.sum * self.sum / self.count as i128
    }

    fn mean(&self) -> i64 {
        if self.count == 0 {
            return 0;
        }
        (self.sum / self.count as i128) as i64
    }

    /// Compare means without division
    fn cmp_mean(&self, other: &Stats) -> Ordering {
        (self.sum * other.count as i128).cmp(&(other.sum * self.count as i128))
    }
}

/// Categories sharing one side of every candidate partition
#[derive(Debug, Clone)]
struct Bin {
    codes: Vec<u32>,
    stats: Stats,
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    split: Split,
    gain: i128,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn better_than(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

fn keep_better(best: &mut Option<SplitCandidate>, candidate: SplitCandidate) {
    if best.as_ref().map_or(true, |current| candidate.better_than(current)) {
        *best = Some(candidate);
    }
}

/// Build a regression tree over a (possibly bootstrapped) row sample
pub struct CartBuilder<'a> {
    config: TreeConfig,
    dataset: &'a Dataset,
    categorical_arity: &'a BTreeMap<usize, usize>,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        dataset: &'a Dataset,
        categorical_arity: &'a BTreeMap<usize, usize>,
        config: TreeConfig,
    ) -> Self {
        Self {
            config,
            dataset,
            categorical_arity,
        }
    }

    /// Build a tree over the rows in `indices` (duplicates allowed)
    pub fn build(&self, indices: &[usize], rng: &mut LcgRng) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(indices, 0, &mut nodes, rng);
        Tree::new(nodes)
    }

    /// Recursively build tree nodes in pre-order
    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut LcgRng,
    ) -> i32 {
        let current_idx = nodes.len();
        let stats = self.stats(indices);

        if depth >= self.config.max_depth
            || indices.len() < 2 * self.config.min_samples_leaf
            || self.is_pure(indices)
        {
            nodes.push(Node::leaf(current_idx as i32, stats.mean()));
            return current_idx as i32;
        }

        let features = rng.choose_sorted(self.dataset.feature_count, self.config.features_per_node);
        let Some(best) = self.find_best_split(indices, &features, stats) else {
            nodes.push(Node::leaf(current_idx as i32, stats.mean()));
            return current_idx as i32;
        };

        let (left_indices, right_indices) = self.partition(indices, best.feature_idx, &best.split);

        // Reserve space for current node
        nodes.push(Node {
            id: current_idx as i32,
            left: 0,
            right: 0,
            feature_idx: best.feature_idx as i32,
            split: Some(best.split),
            leaf: None,
        });

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, rng);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, rng);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx as i32
    }

    /// Best positive-gain split over the sampled features
    fn find_best_split(
        &self,
        indices: &[usize],
        features: &[usize],
        parent: Stats,
    ) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;

        for &feature_idx in features {
            let candidate = if self.categorical_arity.contains_key(&feature_idx) {
                self.best_categorical_split(indices, feature_idx, parent)
            } else {
                self.best_threshold_split(indices, feature_idx, parent)
            };

            if let Some(candidate) = candidate.filter(|c| c.gain > 0) {
                keep_better(&mut best, candidate);
            }
        }

        best
    }

    fn best_categorical_split(
        &self,
        indices: &[usize],
        feature_idx: usize,
        parent: Stats,
    ) -> Option<SplitCandidate> {
        let mut per_category: BTreeMap<u32, Stats> = BTreeMap::new();
        for &idx in indices {
            let Some(code) = category_code(self.dataset.features[idx][feature_idx]) else {
                continue;
            };
            per_category.entry(code).or_default().add(self.dataset.targets[idx]);
        }
        if per_category.len() < 2 {
            return None;
        }

        let mut bins = self.bin_categories(per_category);
        bins.sort_by(|a, b| {
            a.stats
                .cmp_mean(&b.stats)
                .then_with(|| a.codes[0].cmp(&b.codes[0]))
        });

        let parent_score = parent.score();
        let min_leaf = self.config.min_samples_leaf as i64;
        let mut left = Stats::default();
        let mut best = None;

        for k in 1..bins.len() {
            left.merge(bins[k - 1].stats);
            let right = parent.minus(left);
            if left.count < min_leaf || right.count < min_leaf {
                continue;
            }

            let gain = left.score() + right.score() - parent_score;
            let mut categories: Vec<u32> = bins[..k]
                .iter()
                .flat_map(|bin| bin.codes.iter().copied())
                .collect();
            categories.sort_unstable();
            let key = categories.iter().map(|&c| c as i64).collect();

            keep_better(
                &mut best,
                SplitCandidate {
                    feature_idx,
                    split: Split::Categorical { categories },
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, key),
                },
            );
        }

        best
    }

    /// One bin per category, unless that exceeds `max_bins`: then the
    /// `max_bins - 1` most frequent categories keep their own bin and the
    /// rest share the last one.
    fn bin_categories(&self, per_category: BTreeMap<u32, Stats>) -> Vec<Bin> {
        let max_bins = self.config.max_bins.max(2);
        if per_category.len() <= max_bins {
            return per_category
                .into_iter()
                .map(|(code, stats)| Bin {
                    codes: vec![code],
                    stats,
                })
                .collect();
        }

        let mut by_frequency: Vec<(u32, Stats)> = per_category.into_iter().collect();
        by_frequency.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));

        let (own, pooled) = by_frequency.split_at(max_bins - 1);
        let mut bins: Vec<Bin> = own
            .iter()
            .map(|&(code, stats)| Bin {
                codes: vec![code],
                stats,
            })
            .collect();

        let mut other = Bin {
            codes: Vec::with_capacity(pooled.len()),
            stats: Stats::default(),
        };
        for &(code, stats) in pooled {
            other.codes.push(code);
            other.stats.merge(stats);
        }
        other.codes.sort_unstable();
        bins.push(other);

        bins
    }

    fn best_threshold_split(
        &self,
        indices: &[usize],
        feature_idx: usize,
        parent: Stats,
    ) -> Option<SplitCandidate> {
        let mut pairs: Vec<(i64, i64)> = indices
            .iter()
            .map(|&idx| {
                (
                    quantize(self.dataset.features[idx][feature_idx]),
                    self.dataset.targets[idx],
                )
            })
            .collect();
        pairs.sort_unstable();

        let mut distinct: Vec<i64> = pairs.iter().map(|&(value, _)| value).collect();
        distinct.dedup();
        if distinct.len() < 2 {
            return None;
        }
        let candidates = candidate_thresholds(&distinct, self.config.max_bins);

        let parent_score = parent.score();
        let min_leaf = self.config.min_samples_leaf as i64;
        let mut left = Stats::default();
        let mut best = None;

        for (pos, &(value, target)) in pairs.iter().enumerate() {
            left.add(target);
            let at_boundary = pairs.get(pos + 1).is_some_and(|next| next.0 != value);
            if !at_boundary || !candidates.contains(&value) {
                continue;
            }

            let right = parent.minus(left);
            if left.count < min_leaf || right.count < min_leaf {
                continue;
            }

            let gain = left.score() + right.score() - parent_score;
            keep_better(
                &mut best,
                SplitCandidate {
                    feature_idx,
                    split: Split::Threshold { threshold: value },
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, vec![value]),
                },
            );
        }

        best
    }

    fn partition(
        &self,
        indices: &[usize],
        feature_idx: usize,
        split: &Split,
    ) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .copied()
            .partition(|&idx| split.goes_left(self.dataset.features[idx][feature_idx]))
    }

    fn stats(&self, indices: &[usize]) -> Stats {
        let mut stats = Stats::default();
        for &idx in indices {
            stats.add(self.dataset.targets[idx]);
        }
        stats
    }

    fn is_pure(&self, indices: &[usize]) -> bool {
        let mut targets = indices.iter().map(|&idx| self.dataset.targets[idx]);
        match targets.next() {
            Some(first) => targets.all(|t| t == first),
            None => true,
        }
    }
}

/// Every distinct value but the largest can serve as a `<=` threshold; when
/// there are more than `max_bins - 1` of them, take evenly spaced ones.
fn candidate_thresholds(distinct: &[i64], max_bins: usize) -> BTreeSet<i64> {
    let splits = distinct.len() - 1;
    let limit = max_bins.max(2) - 1;
    if splits <= limit {
        distinct[..splits].iter().copied().collect()
    } else {
        (1..=limit)
            .map(|j| distinct[j * splits / (limit + 1)])
            .collect()
    }
}

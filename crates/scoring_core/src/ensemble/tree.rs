//! Regression tree structures
//!
//! Nodes are stored in a flat vector with node 0 as the root. Leaf values
//! are fixed-point integers at [`SCALE`](super::SCALE) precision.

use serde::{Deserialize, Serialize};

use super::quantize;

/// Split rule of an internal node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Split {
    /// Codes listed in `categories` (sorted, unique) go left, all others right
    Categorical { categories: Vec<u32> },
    /// Fixed-point feature value `<= threshold` goes left
    Threshold { threshold: i64 },
}

impl Split {
    /// Whether `value` is routed to the left child
    pub fn goes_left(&self, value: f64) -> bool {
        match self {
            Split::Categorical { categories } => match category_code(value) {
                Some(code) => categories.binary_search(&code).is_ok(),
                None => false,
            },
            Split::Threshold { threshold } => quantize(value) <= *threshold,
        }
    }
}

/// Interpret a feature value as a category code
pub fn category_code(value: f64) -> Option<u32> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// A decision tree node (internal or leaf)
///
/// Internal nodes carry `feature_idx >= 0`, child indices and a split.
/// Leaf nodes carry `feature_idx == -1` and a leaf value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    /// Node ID (for reference, not used in traversal)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    pub split: Option<Split>,

    /// Leaf value (Some for leaf nodes, None for internal nodes)
    pub leaf: Option<i64>,
}

impl Node {
    pub fn categorical(
        id: i32,
        feature_idx: i32,
        categories: Vec<u32>,
        left: i32,
        right: i32,
    ) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            split: Some(Split::Categorical { categories }),
            leaf: None,
        }
    }

    pub fn threshold(id: i32, feature_idx: i32, threshold: i64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            split: Some(Split::Threshold { threshold }),
            leaf: None,
        }
    }

    pub fn leaf(id: i32, value: i64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            split: None,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }

    pub fn leaf_value(&self) -> Option<i64> {
        self.leaf
    }
}

/// A single regression tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate this tree on a feature vector, returning the leaf value.
    ///
    /// Malformed structure evaluates to 0; [`Tree::validate`] rejects such
    /// trees before they are served.
    pub fn evaluate(&self, features: &[f64]) -> i64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0;
            };

            if node.is_leaf() {
                return node.leaf_value().unwrap_or(0);
            }

            let (Some(split), Some(&value)) = (&node.split, features.get(node.feature_idx as usize))
            else {
                return 0;
            };

            let next = if split.goes_left(value) {
                node.left
            } else {
                node.right
            };
            if next < 0 || next as usize >= self.nodes.len() {
                return 0;
            }
            idx = next as usize;
        }
    }

    /// Depth of the deepest leaf (a single leaf has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize, depth: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() => walk(nodes, node.left as usize, depth + 1)
                    .max(walk(nodes, node.right as usize, depth + 1)),
                _ => depth,
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0, 0)
        }
    }

    /// Validate tree structure
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if node.leaf.is_none() {
                    return Err(format!("Leaf node {i} has no leaf value"));
                }
                continue;
            }

            // Children are always written after their parent
            for (side, child) in [("left", node.left), ("right", node.right)] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("Node {i} has invalid {side} child: {child}"));
                }
            }

            if node.feature_idx < 0 {
                return Err(format!(
                    "Internal node {i} has invalid feature index: {}",
                    node.feature_idx
                ));
            }

            match &node.split {
                None => return Err(format!("Internal node {i} has no split")),
                Some(Split::Categorical { categories }) => {
                    if categories.windows(2).any(|w| w[0] >= w[1]) {
                        return Err(format!("Node {i} categories are not sorted and unique"));
                    }
                }
                Some(Split::Threshold { .. }) => {}
            }
        }

        Ok(())
    }
}

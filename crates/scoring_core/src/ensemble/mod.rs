//! Regression-tree ensemble for conversion scoring
//!
//! Trees are grown independently (bagging) and their leaf outputs averaged.
//! Leaf values and continuous split thresholds are fixed-point integers at
//! [`SCALE`] so that a trained forest serializes, hashes and evaluates
//! identically on every platform. Categorical features split by category
//! membership, never by comparing codes as magnitudes.

pub mod forest;
pub mod tree;

pub use forest::{Forest, FORMAT_VERSION};
pub use tree::{category_code, Node, Split, Tree};

/// Fixed-point scale factor (1e6)
pub const SCALE: i64 = 1_000_000;

/// Convert a feature or label value to fixed-point
pub fn quantize(value: f64) -> i64 {
    (value * SCALE as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_rounds_to_scale() {
        assert_eq!(quantize(1.0), SCALE);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 500_000);
        assert_eq!(quantize(-2.25), -2_250_000);
        assert_eq!(quantize(0.000_000_4), 0);
    }
}

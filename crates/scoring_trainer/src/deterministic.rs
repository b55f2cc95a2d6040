//! Deterministic utilities for reproducible training
//!
//! Provides an LCG-based RNG, seed derivation and tie-breaking so that a
//! fixed seed and input order always grow the same forest, regardless of
//! how tree fits are scheduled across threads.

use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: i64) -> Self {
        Self {
            state: Wrapping(seed.rem_euclid(Self::MODULUS)),
        }
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 & (Self::MODULUS - 1)
    }

    /// Random value in [0, max), scaled from the high bits
    pub fn next_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        ((self.next_i64() as u128 * max as u128) >> 31) as usize
    }

    /// `k` distinct values from `0..n` in ascending order (partial Fisher-Yates)
    pub fn choose_sorted(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = i + self.next_range(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool.sort_unstable();
        pool
    }

    /// `n` draws with replacement from `0..n`
    pub fn bootstrap(&mut self, n: usize) -> Vec<usize> {
        (0..n).map(|_| self.next_range(n)).collect()
    }
}

/// Deterministic xxhash64-like hash in pure i64 arithmetic
pub fn xxhash64_i64(data: &[i64], seed: i64) -> i64 {
    const PRIME1: i64 = 0x9E3779B185EBCA87_u64 as i64;
    const PRIME2: i64 = 0xC2B2AE3D27D4EB4F_u64 as i64;
    const PRIME3: i64 = 0x165667B19E3779F9_u64 as i64;
    const PRIME5: i64 = 0x85EBCA77C2B2AE63_u64 as i64;

    let mut h = seed.wrapping_add(PRIME5);

    for &val in data {
        h = h.wrapping_add(val.wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME2);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Independent seed for tree `tree_idx` of a forest trained with `seed`
pub fn tree_seed(seed: i64, tree_idx: usize) -> i64 {
    xxhash64_i64(&[tree_idx as i64], seed)
}

/// Deterministic tie-breaker for split selection
/// Orders by feature index, then by the split's partition key
/// (sorted left categories, or the threshold).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub key: Vec<i64>,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, key: Vec<i64>) -> Self {
        Self { feature_idx, key }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_negative_and_extreme_seeds() {
        for seed in [i64::MIN, -1, 0, i64::MAX] {
            let mut rng = LcgRng::new(seed);
            let v = rng.next_i64();
            assert!((0..1 << 31).contains(&v));
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        let mut seen = [false; 10];
        for _ in 0..1000 {
            let val = rng.next_range(10);
            assert!(val < 10);
            seen[val] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_choose_sorted() {
        let mut rng = LcgRng::new(7);
        let picked = rng.choose_sorted(10, 4);
        assert_eq!(picked.len(), 4);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert!(picked.iter().all(|&p| p < 10));

        assert_eq!(rng.choose_sorted(3, 5), vec![0, 1, 2]);
    }

    #[test]
    fn test_bootstrap_in_range_and_reproducible() {
        let a = LcgRng::new(5).bootstrap(50);
        let b = LcgRng::new(5).bootstrap(50);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a.iter().all(|&i| i < 50));
    }

    #[test]
    fn test_tree_seeds_differ() {
        assert_ne!(tree_seed(42, 0), tree_seed(42, 1));
        assert_eq!(tree_seed(42, 3), tree_seed(42, 3));
        assert_ne!(tree_seed(42, 0), tree_seed(43, 0));
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, vec![1, 4]);
        let t2 = SplitTieBreaker::new(0, vec![2]);
        let t3 = SplitTieBreaker::new(1, vec![0]);

        assert!(t1 < t2);
        assert!(t2 < t3);
    }
}

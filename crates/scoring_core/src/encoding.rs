//! Categorical encoding shared by training and inference
//!
//! Codes are dense integers assigned in lexicographic order of the observed
//! values, so fitting the same value set always yields the same map and the
//! empty default value (which sorts first) always receives code 0. A fitted
//! map is never extended: values unseen at fit time resolve to the default
//! code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{CoreError, Result};
use crate::features::{FeatureIndex, FeatureSource};
use crate::types::Session;

/// Value substituted for missing or unseen categories
pub const DEFAULT_CATEGORY: &str = "";

/// Dense string → code mapping for a single categorical feature
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CategoryCodes {
    codes: BTreeMap<String, u32>,
}

impl CategoryCodes {
    /// Assign codes `0..n` to the distinct values plus `default_value`
    pub fn fit<I, S>(values: I, default_value: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut distinct: BTreeSet<String> =
            values.into_iter().map(|v| v.as_ref().to_string()).collect();
        distinct.insert(default_value.to_string());

        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value, code as u32))
            .collect();

        Self { codes }
    }

    /// Exact code for `value`, if it was observed at fit time
    pub fn code(&self, value: &str) -> Option<u32> {
        self.codes.get(value).copied()
    }

    /// Code for `value`, falling back to the code of `default_value`
    pub fn lookup(&self, value: &str, default_value: &str) -> Result<u32> {
        self.code(value)
            .or_else(|| self.code(default_value))
            .ok_or_else(|| {
                CoreError::Encoding(format!(
                    "default value {default_value:?} is absent from the categorical map"
                ))
            })
    }

    /// Invert a code back to the value it was assigned to
    pub fn decode(&self, code: u32) -> Option<&str> {
        self.codes
            .iter()
            .find(|(_, &c)| c == code)
            .map(|(value, _)| value.as_str())
    }

    /// Number of distinct codes (cardinality)
    pub fn arity(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.codes.iter().map(|(value, &code)| (value.as_str(), code))
    }

    /// Codes must be a permutation of `0..arity` and include `default_value`
    pub fn validate(&self, default_value: &str) -> Result<()> {
        let mut seen = vec![false; self.codes.len()];
        for (value, &code) in &self.codes {
            let slot = seen.get_mut(code as usize).ok_or_else(|| {
                CoreError::Encoding(format!("code {code} for {value:?} is out of range"))
            })?;
            if *slot {
                return Err(CoreError::Encoding(format!("code {code} assigned twice")));
            }
            *slot = true;
        }
        if self.code(default_value).is_none() {
            return Err(CoreError::Encoding(format!(
                "default value {default_value:?} is absent from the categorical map"
            )));
        }
        Ok(())
    }
}

/// Fit a single feature's codes from a value set
pub fn fit<I, S>(values: I, default_value: &str) -> CategoryCodes
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    CategoryCodes::fit(values, default_value)
}

/// Resolve `value` through `codes`, substituting the default for unseen values
pub fn lookup(codes: &CategoryCodes, value: &str, default_value: &str) -> Result<u32> {
    codes.lookup(value, default_value)
}

/// Per-feature categorical codes, keyed by feature name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CategoricalMap {
    features: BTreeMap<String, CategoryCodes>,
}

impl CategoricalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: impl Into<String>, codes: CategoryCodes) {
        self.features.insert(feature.into(), codes);
    }

    pub fn get(&self, feature: &str) -> Option<&CategoryCodes> {
        self.features.get(feature)
    }

    /// Fit codes for every feature of `index` that `rows` expose as categorical
    pub fn fit_rows<S: FeatureSource>(
        rows: &[S],
        index: &FeatureIndex,
        default_value: &str,
    ) -> Self {
        let mut map = Self::new();
        for name in index.names() {
            let Some(values) = rows
                .iter()
                .map(|row| row.categorical_value(name))
                .collect::<Option<Vec<&str>>>()
            else {
                continue;
            };
            map.insert(name.clone(), CategoryCodes::fit(values, default_value));
        }
        map
    }

    pub fn fit_sessions(sessions: &[Session], index: &FeatureIndex, default_value: &str) -> Self {
        Self::fit_rows(sessions, index, default_value)
    }

    /// Code of `value` for `feature`; unknown features are an invariant violation
    pub fn lookup(&self, feature: &str, value: &str, default_value: &str) -> Result<u32> {
        self.features
            .get(feature)
            .ok_or_else(|| {
                CoreError::Encoding(format!("no categorical codes for feature {feature:?}"))
            })?
            .lookup(value, default_value)
    }

    pub fn arity(&self, feature: &str) -> Option<usize> {
        self.features.get(feature).map(CategoryCodes::arity)
    }

    /// Vector position → cardinality for every categorical feature in `index`
    pub fn categorical_arity(&self, index: &FeatureIndex) -> BTreeMap<usize, usize> {
        index
            .names()
            .iter()
            .enumerate()
            .filter_map(|(position, name)| self.arity(name).map(|arity| (position, arity)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn validate(&self, default_value: &str) -> Result<()> {
        for (feature, codes) in &self.features {
            codes
                .validate(default_value)
                .map_err(|e| CoreError::Encoding(format!("feature {feature:?}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Session;
    use proptest::prelude::*;

    #[test]
    fn test_fit_assigns_sorted_dense_codes() {
        let codes = fit(["Safari", "Chrome", "Firefox", "Chrome"], DEFAULT_CATEGORY);
        assert_eq!(codes.arity(), 4);
        assert_eq!(codes.code(""), Some(0));
        assert_eq!(codes.code("Chrome"), Some(1));
        assert_eq!(codes.code("Firefox"), Some(2));
        assert_eq!(codes.code("Safari"), Some(3));
    }

    #[test]
    fn test_default_present_even_when_unobserved() {
        let codes = fit(["a"], DEFAULT_CATEGORY);
        assert_eq!(codes.lookup("never-seen", DEFAULT_CATEGORY).unwrap(), 0);
        assert!(codes.validate(DEFAULT_CATEGORY).is_ok());
    }

    #[test]
    fn test_lookup_without_default_is_encoding_error() {
        let codes = fit(["a"], "a");
        let err = codes.lookup("b", "").unwrap_err();
        assert!(matches!(err, CoreError::Encoding(_)));
    }

    #[test]
    fn test_decode_inverts_codes() {
        let codes = fit(["x", "y"], DEFAULT_CATEGORY);
        for (value, code) in codes.iter() {
            assert_eq!(codes.decode(code), Some(value));
        }
        assert_eq!(codes.decode(99), None);
    }

    #[test]
    fn test_validate_rejects_gaps() {
        let codes: CategoryCodes = serde_json::from_str(r#"{"":0,"a":2}"#).unwrap();
        assert!(codes.validate(DEFAULT_CATEGORY).is_err());
    }

    #[test]
    fn test_fit_rows_covers_index_features() {
        let mut sessions = vec![Session {
            session_id: "s".into(),
            landing_page_id: "P1".into(),
            referrer_id: "r".into(),
            browser: "Chrome".into(),
            landing_time: None,
            converted: true,
        }];
        sessions.extend(Session::default_rows());

        let index = FeatureIndex::lead_defaults();
        let map = CategoricalMap::fit_rows(&sessions, &index, DEFAULT_CATEGORY);

        assert_eq!(map.len(), 3);
        assert_eq!(map.arity("landingPage"), Some(2));
        assert_eq!(map.lookup("browser", "Chrome", DEFAULT_CATEGORY).unwrap(), 1);

        let arity = map.categorical_arity(&index);
        assert_eq!(arity.get(&0), Some(&2));
        assert_eq!(arity.len(), 3);
    }

    #[test]
    fn test_unknown_feature_is_encoding_error() {
        let map = CategoricalMap::new();
        assert!(matches!(
            map.lookup("landingPage", "P1", DEFAULT_CATEGORY),
            Err(CoreError::Encoding(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_fit_is_deterministic(values in proptest::collection::vec("[a-z]{0,6}", 0..40)) {
            let mut reversed = values.clone();
            reversed.reverse();
            prop_assert_eq!(fit(&values, DEFAULT_CATEGORY), fit(&reversed, DEFAULT_CATEGORY));
        }

        #[test]
        fn prop_lookup_stable_and_total(
            values in proptest::collection::vec("[a-z]{1,6}", 1..20),
            probe in "[a-z]{0,8}",
        ) {
            let codes = fit(&values, DEFAULT_CATEGORY);
            let first = codes.lookup(&probe, DEFAULT_CATEGORY).unwrap();
            let second = codes.lookup(&probe, DEFAULT_CATEGORY).unwrap();
            prop_assert_eq!(first, second);
            prop_assert!((first as usize) < codes.arity());
            if !values.contains(&probe) && !probe.is_empty() {
                prop_assert_eq!(first, 0);
            }
        }
    }
}

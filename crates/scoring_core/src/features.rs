//! Feature vectorization for sessions and queries
//!
//! A [`FeatureIndex`] fixes the position of every named feature in the
//! vector. Positions are assigned in insertion order and never renumbered,
//! so new features can be appended without disturbing trained models.

use serde::{Deserialize, Serialize};

use crate::encoding::{CategoricalMap, DEFAULT_CATEGORY};
use crate::errors::{CoreError, Result};
use crate::types::{LabeledVector, Query, Session};

/// Feature vector consumed by the ensemble
pub type FeatureVector = Vec<f64>;

pub const LANDING_PAGE: &str = "landingPage";
pub const REFERRER: &str = "referrer";
pub const BROWSER: &str = "browser";

/// Anything that can supply named feature values to the vectorizer
pub trait FeatureSource {
    /// Raw string value of a categorical feature, `None` if not provided
    fn categorical_value(&self, feature: &str) -> Option<&str>;

    /// Value of a continuous feature, `None` if not provided
    fn numeric_value(&self, _feature: &str) -> Option<f64> {
        None
    }
}

impl FeatureSource for Session {
    fn categorical_value(&self, feature: &str) -> Option<&str> {
        match feature {
            LANDING_PAGE => Some(&self.landing_page_id),
            REFERRER => Some(&self.referrer_id),
            BROWSER => Some(&self.browser),
            _ => None,
        }
    }
}

impl FeatureSource for Query {
    fn categorical_value(&self, feature: &str) -> Option<&str> {
        match feature {
            LANDING_PAGE => Some(&self.landing_page_id),
            REFERRER => Some(&self.referrer_id),
            BROWSER => Some(&self.browser),
            _ => None,
        }
    }
}

/// Insertion-ordered feature name → vector position mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FeatureIndex {
    names: Vec<String>,
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// landingPage → 0, referrer → 1, browser → 2
    pub fn lead_defaults() -> Self {
        let mut index = Self::new();
        for name in [LANDING_PAGE, REFERRER, BROWSER] {
            index.push(name);
        }
        index
    }

    /// Append a feature, returning its position. Existing features keep theirs.
    pub fn push(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(position) = self.position(&name) {
            return position;
        }
        self.names.push(name);
        self.names.len() - 1
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Resolve every indexed feature of `source` into its vector slot.
///
/// Categorical features go through the fitted map (unseen values become the
/// default code); features without codes must be supplied as numbers.
pub fn vectorize<S: FeatureSource + ?Sized>(
    source: &S,
    map: &CategoricalMap,
    index: &FeatureIndex,
) -> Result<FeatureVector> {
    index
        .names()
        .iter()
        .map(|name| {
            if map.get(name).is_some() {
                let value = source.categorical_value(name).unwrap_or(DEFAULT_CATEGORY);
                Ok(map.lookup(name, value, DEFAULT_CATEGORY)? as f64)
            } else {
                source.numeric_value(name).ok_or_else(|| {
                    CoreError::Encoding(format!(
                        "feature {name:?} has neither categorical codes nor a numeric value"
                    ))
                })
            }
        })
        .collect()
}

/// 1.0 for converted sessions, 0.0 otherwise
pub fn label(session: &Session) -> f64 {
    if session.converted {
        1.0
    } else {
        0.0
    }
}

pub fn labeled_vector(
    session: &Session,
    map: &CategoricalMap,
    index: &FeatureIndex,
) -> Result<LabeledVector> {
    Ok(LabeledVector {
        label: label(session),
        features: vectorize(session, map, index)?,
    })
}

/// Vectorize a session set in order
pub fn labeled_vectors(
    sessions: &[Session],
    map: &CategoricalMap,
    index: &FeatureIndex,
) -> Result<Vec<LabeledVector>> {
    sessions
        .iter()
        .map(|session| labeled_vector(session, map, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(page: &str, referrer: &str, browser: &str, converted: bool) -> Session {
        Session {
            session_id: format!("{page}-{referrer}-{browser}"),
            landing_page_id: page.into(),
            referrer_id: referrer.into(),
            browser: browser.into(),
            landing_time: None,
            converted,
        }
    }

    fn fitted() -> (Vec<Session>, CategoricalMap, FeatureIndex) {
        let mut sessions = vec![
            session("P1", "google", "Chrome", true),
            session("P2", "", "Firefox", false),
        ];
        sessions.extend(Session::default_rows());
        let index = FeatureIndex::lead_defaults();
        let map = CategoricalMap::fit_rows(&sessions, &index, DEFAULT_CATEGORY);
        (sessions, map, index)
    }

    #[test]
    fn test_lead_defaults_order() {
        let index = FeatureIndex::lead_defaults();
        assert_eq!(index.position(LANDING_PAGE), Some(0));
        assert_eq!(index.position(REFERRER), Some(1));
        assert_eq!(index.position(BROWSER), Some(2));
    }

    #[test]
    fn test_push_never_renumbers() {
        let mut index = FeatureIndex::lead_defaults();
        assert_eq!(index.push("device"), 3);
        assert_eq!(index.push(LANDING_PAGE), 0);
        assert_eq!(index.len(), 4);
        assert_eq!(index.position(BROWSER), Some(2));
    }

    #[test]
    fn test_session_and_query_vectors_agree() {
        let (sessions, map, index) = fitted();
        let from_session = vectorize(&sessions[0], &map, &index).unwrap();
        let query = Query {
            landing_page_id: "P1".into(),
            referrer_id: "google".into(),
            browser: "Chrome".into(),
        };
        let from_query = vectorize(&query, &map, &index).unwrap();

        assert_eq!(from_session, from_query);
        assert_eq!(from_session, vec![1.0, 1.0, 1.0]);
        assert_eq!(from_query.len(), index.len());
    }

    #[test]
    fn test_unseen_query_values_use_default_code() {
        let (_, map, index) = fitted();
        let query = Query {
            landing_page_id: "unseen_page".into(),
            referrer_id: "".into(),
            browser: "Firefox".into(),
        };
        let vector = vectorize(&query, &map, &index).unwrap();
        assert_eq!(vector, vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_labels() {
        let (sessions, map, index) = fitted();
        let rows = labeled_vectors(&sessions, &map, &index).unwrap();
        let labels: Vec<f64> = rows.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![1.0, 0.0, 0.0, 1.0]);
        assert!(rows.iter().all(|r| r.features.len() == index.len()));
    }

    #[test]
    fn test_feature_without_codes_or_number_fails() {
        let (sessions, map, mut index) = fitted();
        index.push("dwellSeconds");
        assert!(matches!(
            vectorize(&sessions[0], &map, &index),
            Err(CoreError::Encoding(_))
        ));
    }
}

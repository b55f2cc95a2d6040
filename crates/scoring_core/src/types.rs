//! Common data structures shared by training and serving

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CoreError, Result};

/// Property carrying the session identifier on view and buy events
pub const SESSION_ID_PROPERTY: &str = "sessionId";
/// Optional referrer property on view events
pub const REFERRER_PROPERTY: &str = "referrerId";
/// Optional browser property on view events
pub const BROWSER_PROPERTY: &str = "browser";

/// Raw behavioral event as supplied by the event store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Store-assigned identifier, used only for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(rename = "event")]
    pub event_name: String,
    #[serde(default)]
    pub target_entity_type: Option<String>,
    #[serde(default)]
    pub target_entity_id: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub event_time: DateTime<Utc>,
}

/// The two event kinds that take part in session reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    View,
    Buy,
}

impl Event {
    /// Classify the event by name; anything other than view/buy is `None`
    pub fn kind(&self) -> Option<SessionEventKind> {
        match self.event_name.as_str() {
            "view" => Some(SessionEventKind::View),
            "buy" => Some(SessionEventKind::Buy),
            _ => None,
        }
    }

    /// String-valued property, `None` when absent or not a string
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// The `sessionId` property; its absence is a data contract violation
    pub fn session_id(&self) -> Result<&str> {
        self.property_str(SESSION_ID_PROPERTY)
            .ok_or_else(|| CoreError::MissingField {
                event_id: self.describe(),
                field: SESSION_ID_PROPERTY.to_string(),
            })
    }

    /// Short human-readable identity for log lines and errors
    pub fn describe(&self) -> String {
        match &self.event_id {
            Some(id) => id.clone(),
            None => format!(
                "{}:{}:{}@{}",
                self.event_name,
                self.entity_type,
                self.entity_id,
                self.event_time.to_rfc3339()
            ),
        }
    }
}

/// One reconstructed browsing episode anchored by its landing view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub landing_page_id: String,
    pub referrer_id: String,
    pub browser: String,
    /// Time of the landing view; `None` for synthetic default rows
    pub landing_time: Option<DateTime<Utc>>,
    pub converted: bool,
}

impl Session {
    /// Synthetic row with every categorical field set to the default value
    pub fn default_row(converted: bool) -> Self {
        Self {
            session_id: String::new(),
            landing_page_id: String::new(),
            referrer_id: String::new(),
            browser: String::new(),
            landing_time: None,
            converted,
        }
    }

    /// The two default rows (one per label) appended before encoding
    pub fn default_rows() -> [Session; 2] {
        [Self::default_row(false), Self::default_row(true)]
    }
}

/// Serving-time query, the categorical part of a session
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    pub landing_page_id: String,
    pub referrer_id: String,
    pub browser: String,
}

/// Score returned for a query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PredictedResult {
    pub score: f64,
}

/// Training row: label plus fixed-order feature vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledVector {
    pub label: f64,
    pub features: Vec<f64>,
}

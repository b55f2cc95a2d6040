//! Event-store boundary: filtering and newline-delimited JSON export files
//!
//! The reconstructor expects a stream already restricted to user view/buy
//! events. This module applies that restriction to store exports so the
//! trainer CLI can run against a local file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::errors::{CoreError, Result};
use crate::types::Event;

/// Which `(event, targetEntityType)` pairs to keep for a given entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub entity_type: String,
    pub accepted: Vec<(String, String)>,
}

impl EventFilter {
    /// `user` views of `page`s and buys of `item`s
    pub fn sessions() -> Self {
        Self {
            entity_type: "user".to_string(),
            accepted: vec![
                ("view".to_string(), "page".to_string()),
                ("buy".to_string(), "item".to_string()),
            ],
        }
    }

    pub fn accepts(&self, event: &Event) -> bool {
        if event.entity_type != self.entity_type {
            return false;
        }
        let Some(target_type) = event.target_entity_type.as_deref() else {
            return false;
        };
        self.accepted
            .iter()
            .any(|(name, target)| *name == event.event_name && target == target_type)
    }

    /// Keep accepted events, preserving order
    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        events.into_iter().filter(|e| self.accepts(e)).collect()
    }
}

/// Parse newline-delimited JSON events in file order.
///
/// Blank lines are skipped; a line that is not a valid event is an error
/// naming its line number.
pub fn parse_events_jsonl<R: BufRead>(reader: R) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(line).map_err(|e| {
            CoreError::InvalidInput(format!("Line {}: invalid event: {e}", line_idx + 1))
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Read an export file and keep only the events accepted by `filter`
#[instrument(skip(filter))]
pub fn read_events_jsonl<P: AsRef<Path> + std::fmt::Debug>(
    path: P,
    filter: &EventFilter,
) -> Result<Vec<Event>> {
    let file = File::open(path.as_ref())?;
    let all = parse_events_jsonl(BufReader::new(file))?;
    let total = all.len();
    let kept = filter.apply(all);
    debug!(skipped = total - kept.len(), "filtered events");
    info!("Read {} events ({} kept) from {}", total, kept.len(), path.as_ref().display());
    Ok(kept)
}

//! Session reconstruction from view/buy event streams
//!
//! Events are grouped by `sessionId` with an associative accumulator so the
//! grouping can be folded over independent partitions and merged. Each
//! group keeps only its landing view (earliest `(event_time, sequence)`)
//! and its latest buy time, which is enough to decide conversion:
//! a session converts iff some buy strictly postdates the landing view.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::errors::{CoreError, Result};
use crate::types::{Event, SessionEventKind, Session, BROWSER_PROPERTY, REFERRER_PROPERTY};

/// Candidate landing view. `sequence` is the event's position in the input
/// stream and breaks timestamp ties in favour of the first-seen event.
#[derive(Debug, Clone)]
struct Landing {
    time: DateTime<Utc>,
    sequence: usize,
    page_id: String,
    referrer_id: String,
    browser: String,
}

impl Landing {
    fn precedes(&self, other: &Landing) -> bool {
        (self.time, self.sequence) < (other.time, other.sequence)
    }
}

#[derive(Debug, Clone, Default)]
struct SessionAccumulator {
    landing: Option<Landing>,
    latest_buy: Option<DateTime<Utc>>,
}

impl SessionAccumulator {
    fn offer_view(&mut self, candidate: Landing) {
        match &self.landing {
            Some(current) if !candidate.precedes(current) => {}
            _ => self.landing = Some(candidate),
        }
    }

    fn offer_buy(&mut self, time: DateTime<Utc>) {
        self.latest_buy = Some(match self.latest_buy {
            Some(current) => current.max(time),
            None => time,
        });
    }

    fn merge(&mut self, other: SessionAccumulator) {
        if let Some(landing) = other.landing {
            self.offer_view(landing);
        }
        if let Some(buy) = other.latest_buy {
            self.offer_buy(buy);
        }
    }

    /// Sessions seen only through buy events have no landing and yield nothing
    fn finish(self, session_id: String) -> Option<Session> {
        let landing = self.landing?;
        let converted = self.latest_buy.is_some_and(|buy| buy > landing.time);
        Some(Session {
            session_id,
            landing_page_id: landing.page_id,
            referrer_id: landing.referrer_id,
            browser: landing.browser,
            landing_time: Some(landing.time),
            converted,
        })
    }
}

type Groups = BTreeMap<String, SessionAccumulator>;

fn accumulate(mut groups: Groups, sequence: usize, event: &Event) -> Result<Groups> {
    let Some(kind) = event.kind() else {
        debug!(event = %event.describe(), "skipping non-session event");
        return Ok(groups);
    };

    let session_id = event.session_id()?;
    let entry = groups.entry(session_id.to_string()).or_default();

    match kind {
        SessionEventKind::View => {
            let page_id = event
                .target_entity_id
                .clone()
                .ok_or_else(|| CoreError::MissingField {
                    event_id: event.describe(),
                    field: "targetEntityId".to_string(),
                })?;
            entry.offer_view(Landing {
                time: event.event_time,
                sequence,
                page_id,
                referrer_id: event.property_str(REFERRER_PROPERTY).unwrap_or_default().to_string(),
                browser: event.property_str(BROWSER_PROPERTY).unwrap_or_default().to_string(),
            });
        }
        SessionEventKind::Buy => entry.offer_buy(event.event_time),
    }

    Ok(groups)
}

fn merge_groups(left: Groups, right: Groups) -> Groups {
    let (mut into, from) = if left.len() >= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    for (session_id, acc) in from {
        into.entry(session_id).or_default().merge(acc);
    }
    into
}

/// Join view and buy events into one session per `sessionId` seen on a view.
///
/// The input order is the ingestion order used for tie-breaking. Output is
/// sorted by session id. Fails on the first event lacking `sessionId`
/// (or a view lacking its target page).
#[instrument(skip(events), fields(events = events.len()))]
pub fn reconstruct(events: &[Event]) -> Result<Vec<Session>> {
    let groups = events
        .par_iter()
        .enumerate()
        .try_fold(Groups::new, |groups, (sequence, event)| {
            accumulate(groups, sequence, event)
        })
        .try_reduce(Groups::new, |a, b| Ok(merge_groups(a, b)))?;

    let group_count = groups.len();
    let sessions: Vec<Session> = groups
        .into_iter()
        .filter_map(|(session_id, acc)| acc.finish(session_id))
        .collect();

    let converted = sessions.iter().filter(|s| s.converted).count();
    info!(
        sessions = sessions.len(),
        converted,
        buy_only_discarded = group_count - sessions.len(),
        "reconstructed sessions"
    );

    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Map, Value};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn props(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn view(session: &str, page: &str, t: i64) -> Event {
        view_with(session, page, t, &[])
    }

    fn view_with(session: &str, page: &str, t: i64, extra: &[(&str, &str)]) -> Event {
        let mut properties = props(extra);
        properties.insert("sessionId".into(), json!(session));
        Event {
            event_id: None,
            entity_type: "user".into(),
            entity_id: "u1".into(),
            event_name: "view".into(),
            target_entity_type: Some("page".into()),
            target_entity_id: Some(page.into()),
            properties,
            event_time: at(t),
        }
    }

    fn buy(session: &str, item: &str, t: i64) -> Event {
        Event {
            event_id: None,
            entity_type: "user".into(),
            entity_id: "u1".into(),
            event_name: "buy".into(),
            target_entity_type: Some("item".into()),
            target_entity_id: Some(item.into()),
            properties: props(&[("sessionId", session)]),
            event_time: at(t),
        }
    }

    #[test]
    fn test_view_then_buy_converts() {
        let sessions = reconstruct(&[view("A", "P1", 1), buy("A", "I1", 2)]).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "A");
        assert_eq!(sessions[0].landing_page_id, "P1");
        assert!(sessions[0].converted);
    }

    #[test]
    fn test_earliest_view_is_landing() {
        let sessions = reconstruct(&[view("B", "P2", 5), view("B", "P3", 3)]).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].landing_page_id, "P3");
        assert_eq!(sessions[0].landing_time, Some(at(3)));
        assert!(!sessions[0].converted);
    }

    #[test]
    fn test_buy_must_strictly_follow_landing() {
        let same_time = reconstruct(&[view("A", "P1", 4), buy("A", "I1", 4)]).unwrap();
        assert!(!same_time[0].converted);

        let before = reconstruct(&[buy("A", "I1", 1), view("A", "P1", 4)]).unwrap();
        assert!(!before[0].converted);

        let mixed =
            reconstruct(&[buy("A", "I1", 1), view("A", "P1", 4), buy("A", "I2", 9)]).unwrap();
        assert!(mixed[0].converted);
    }

    #[test]
    fn test_buy_only_sessions_are_discarded() {
        let sessions = reconstruct(&[buy("X", "I1", 1), view("A", "P1", 2)]).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "A");
    }

    #[test]
    fn test_equal_timestamps_pick_first_seen() {
        let sessions = reconstruct(&[view("A", "first", 7), view("A", "second", 7)]).unwrap();
        assert_eq!(sessions[0].landing_page_id, "first");

        let reversed = reconstruct(&[view("A", "second", 7), view("A", "first", 7)]).unwrap();
        assert_eq!(reversed[0].landing_page_id, "second");
    }

    #[test]
    fn test_landing_properties_and_defaults() {
        let sessions = reconstruct(&[
            view_with("A", "P1", 1, &[("referrerId", "google"), ("browser", "Chrome")]),
            view_with("A", "P2", 2, &[("referrerId", "bing")]),
            view("B", "P3", 1),
        ])
        .unwrap();

        assert_eq!(sessions[0].referrer_id, "google");
        assert_eq!(sessions[0].browser, "Chrome");
        assert_eq!(sessions[1].referrer_id, "");
        assert_eq!(sessions[1].browser, "");
    }

    #[test]
    fn test_missing_session_id_aborts() {
        let mut bad = view("A", "P1", 1);
        bad.properties.remove("sessionId");
        let err = reconstruct(&[view("B", "P2", 1), bad]).unwrap_err();
        assert!(matches!(err, CoreError::MissingField { .. }));
    }

    #[test]
    fn test_view_without_target_aborts() {
        let mut bad = view("A", "P1", 1);
        bad.target_entity_id = None;
        let err = reconstruct(&[bad]).unwrap_err();
        match err {
            CoreError::MissingField { field, .. } => assert_eq!(field, "targetEntityId"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_large_stream_matches_per_session_expectation() {
        let mut events = Vec::new();
        for s in 0..500 {
            let id = format!("s{s:04}");
            events.push(view(&id, &format!("P{}", s % 7), 100 + s));
            events.push(view(&id, "late", 200 + s));
            if s % 3 == 0 {
                events.push(buy(&id, "I", 150 + s));
            }
        }

        let first = reconstruct(&events).unwrap();
        let second = reconstruct(&events).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 500);
        assert!(first.windows(2).all(|w| w[0].session_id < w[1].session_id));
        for (s, session) in first.iter().enumerate() {
            assert_eq!(session.landing_page_id, format!("P{}", s % 7));
            assert_eq!(session.converted, s % 3 == 0);
        }
    }
}

// src/mining/extractor.rs — Snapshot history -> state transitions

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};

use super::types::{domain_of, is_noise, normalize_state, Snapshot, StateRecord, Transition};
use crate::infra::config::MiningConfig;
use crate::infra::errors::EngineError;

/// Naive layouts accepted when a timestamp carries no offset.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Result of one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Grouped by entity (ascending id), time-ordered within each entity.
    pub transitions: Vec<Transition>,
    /// Records that parsed into snapshots and passed the domain filter.
    pub accepted: usize,
    /// Malformed records (bad entity id, missing or unparseable timestamp).
    pub skipped: usize,
    /// Well-formed records outside `enabled_domains`.
    pub filtered: usize,
    pub entities: BTreeSet<String>,
    /// Earliest and latest accepted snapshot.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Extraction {
    /// All transitions merged into one time-ordered stream.
    ///
    /// The sort is stable, so equal timestamps keep entity order and
    /// within-entity order.
    pub fn timeline(&self) -> Vec<Transition> {
        let mut merged = self.transitions.clone();
        merged.sort_by_key(|t| t.timestamp);
        merged
    }

    pub fn domains(&self) -> BTreeSet<String> {
        self.entities
            .iter()
            .map(|e| domain_of(e).to_string())
            .collect()
    }
}

/// Parse an RFC 3339 timestamp; naive date-times are read in `tz`.
pub fn parse_timestamp(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Validate one raw record.
pub fn parse_record(record: &StateRecord, tz: &Tz) -> Result<Snapshot, EngineError> {
    let entity_id = record
        .entity_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !domain_of(id).is_empty())
        .ok_or_else(|| EngineError::InvalidInput("record without a valid entity_id".into()))?;

    let raw_ts = record.timestamp_text().ok_or_else(|| {
        EngineError::InvalidInput(format!("record for {entity_id} has no timestamp"))
    })?;

    let timestamp = parse_timestamp(raw_ts, tz).ok_or_else(|| {
        EngineError::InvalidInput(format!(
            "unparseable timestamp '{raw_ts}' for {entity_id}"
        ))
    })?;

    Ok(Snapshot {
        entity_id: entity_id.to_string(),
        state: normalize_state(&record.state_text()),
        timestamp,
    })
}

/// Turn raw records into transitions.
///
/// Bad records are counted and skipped, never fatal. Records outside
/// `enabled_domains` are dropped before any pairing happens.
pub fn extract(records: &[StateRecord], config: &MiningConfig) -> Extraction {
    let tz = config.time_zone();
    let mut out = Extraction::default();
    let mut by_entity: BTreeMap<String, Vec<Snapshot>> = BTreeMap::new();

    for record in records {
        let snapshot = match parse_record(record, &tz) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Skipping state record: {}", e);
                out.skipped += 1;
                continue;
            }
        };

        if !config.domain_enabled(domain_of(&snapshot.entity_id)) {
            out.filtered += 1;
            continue;
        }

        out.accepted += 1;
        out.window = Some(match out.window {
            None => (snapshot.timestamp, snapshot.timestamp),
            Some((lo, hi)) => (lo.min(snapshot.timestamp), hi.max(snapshot.timestamp)),
        });
        by_entity
            .entry(snapshot.entity_id.clone())
            .or_default()
            .push(snapshot);
    }

    for (entity_id, mut snapshots) in by_entity {
        snapshots.sort_by_key(|s| s.timestamp);
        out.transitions.extend(pair_snapshots(&entity_id, &snapshots));
        out.entities.insert(entity_id);
    }

    tracing::debug!(
        "Extracted {} transitions from {} snapshots ({} skipped, {} filtered)",
        out.transitions.len(),
        out.accepted,
        out.skipped,
        out.filtered
    );
    out
}

/// Consecutive-pair scan over one entity's ordered snapshots.
fn pair_snapshots(entity_id: &str, snapshots: &[Snapshot]) -> Vec<Transition> {
    snapshots
        .windows(2)
        .filter_map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            if prev.state == curr.state || is_noise(&prev.state) || is_noise(&curr.state) {
                return None;
            }
            Some(Transition {
                entity_id: entity_id.to_string(),
                from_state: prev.state.clone(),
                to_state: curr.state.clone(),
                timestamp: curr.timestamp,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rec(entity: &str, state: &str, ts: &str) -> StateRecord {
        StateRecord::new(entity, state, ts)
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let tz = Tz::UTC;
        let expected = Utc.with_ymd_and_hms(2024, 3, 4, 8, 15, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-04T08:15:00Z", &tz), Some(expected));
        assert_eq!(parse_timestamp("2024-03-04T10:15:00+02:00", &tz), Some(expected));
        assert_eq!(parse_timestamp("2024-03-04T08:15:00.123456+00:00", &tz).map(|t| t.timestamp()), Some(expected.timestamp()));
        assert_eq!(parse_timestamp("2024-03-04 08:15:00", &tz), Some(expected));
        assert_eq!(parse_timestamp("yesterday", &tz), None);

        // Naive values are local time in the configured zone
        let berlin = parse_timestamp("2024-03-04T09:15:00", &Tz::Europe__Berlin);
        assert_eq!(berlin, Some(expected));
    }

    #[test]
    fn test_extracts_changes_in_time_order() {
        let records = vec![
            rec("light.kitchen", "on", "2024-01-01T08:00:00Z"),
            rec("light.kitchen", "off", "2024-01-01T07:00:00Z"),
            rec("light.kitchen", "on", "2024-01-01T08:30:00Z"),
            rec("light.kitchen", "off", "2024-01-01T09:00:00Z"),
        ];
        let out = extract(&records, &MiningConfig::default());

        let pairs: Vec<(&str, &str)> = out
            .transitions
            .iter()
            .map(|t| (t.from_state.as_str(), t.to_state.as_str()))
            .collect();
        assert_eq!(pairs, vec![("off", "on"), ("on", "off")]);
        assert_eq!(out.accepted, 4);
        assert_eq!(out.skipped, 0);
    }

    #[test]
    fn test_noise_never_forms_a_transition() {
        let records = vec![
            rec("switch.fan", "off", "2024-01-01T08:00:00Z"),
            rec("switch.fan", "unavailable", "2024-01-01T08:05:00Z"),
            rec("switch.fan", "on", "2024-01-01T08:10:00Z"),
            rec("switch.fan", "", "2024-01-01T08:15:00Z"),
        ];
        let out = extract(&records, &MiningConfig::default());
        assert!(out.transitions.is_empty());
    }

    #[test]
    fn test_states_are_normalized() {
        let records = vec![
            rec("cover.garage", "Closed", "2024-01-01T08:00:00Z"),
            rec("cover.garage", " closed ", "2024-01-01T08:05:00Z"),
            rec("cover.garage", "OPEN", "2024-01-01T08:10:00Z"),
        ];
        let out = extract(&records, &MiningConfig::default());
        assert_eq!(out.transitions.len(), 1);
        assert_eq!(out.transitions[0].to_state, "open");
    }

    #[test]
    fn test_bad_records_are_counted_not_fatal() {
        let mut no_ts = rec("light.a", "on", "");
        no_ts.last_changed = None;
        let records = vec![
            rec("light.a", "off", "2024-01-01T08:00:00Z"),
            rec("light.a", "on", "not a time"),
            rec("nodomain", "on", "2024-01-01T08:00:00Z"),
            no_ts,
            rec("light.a", "on", "2024-01-01T09:00:00Z"),
        ];
        let out = extract(&records, &MiningConfig::default());
        assert_eq!(out.skipped, 3);
        assert_eq!(out.accepted, 2);
        assert_eq!(out.transitions.len(), 1);
    }

    #[test]
    fn test_single_snapshot_yields_nothing() {
        let out = extract(
            &[rec("light.a", "on", "2024-01-01T08:00:00Z")],
            &MiningConfig::default(),
        );
        assert!(out.transitions.is_empty());
        assert_eq!(out.entities.len(), 1);
    }

    #[test]
    fn test_duplicate_timestamps_keep_input_order() {
        let records = vec![
            rec("switch.a", "off", "2024-01-01T08:00:00Z"),
            rec("switch.a", "on", "2024-01-01T08:00:00Z"),
            rec("switch.a", "off", "2024-01-01T08:00:00Z"),
        ];
        let out = extract(&records, &MiningConfig::default());
        let to: Vec<&str> = out.transitions.iter().map(|t| t.to_state.as_str()).collect();
        assert_eq!(to, vec!["on", "off"]);
    }

    #[test]
    fn test_domain_allow_list_applies_before_pairing() {
        let config = MiningConfig {
            enabled_domains: vec!["light".into()],
            ..MiningConfig::default()
        };
        let records = vec![
            rec("light.a", "off", "2024-01-01T08:00:00Z"),
            rec("light.a", "on", "2024-01-01T09:00:00Z"),
            rec("sensor.t", "20", "2024-01-01T08:00:00Z"),
            rec("sensor.t", "21", "2024-01-01T09:00:00Z"),
        ];
        let out = extract(&records, &config);
        assert_eq!(out.filtered, 2);
        assert_eq!(out.transitions.len(), 1);
        assert_eq!(out.domains().into_iter().collect::<Vec<_>>(), vec!["light"]);
    }

    #[test]
    fn test_timeline_merges_entities_by_time() {
        let records = vec![
            rec("light.b", "off", "2024-01-01T08:00:00Z"),
            rec("light.b", "on", "2024-01-01T08:02:00Z"),
            rec("light.a", "off", "2024-01-01T08:00:00Z"),
            rec("light.a", "on", "2024-01-01T08:01:00Z"),
        ];
        let out = extract(&records, &MiningConfig::default());
        let timeline = out.timeline();
        let ids: Vec<&str> = timeline.iter().map(|t| t.entity_id.as_str()).collect();
        // Grouped output is by entity id; the timeline is by time.
        assert_eq!(ids, vec!["light.a", "light.b"]);
        let (lo, hi) = out.window.unwrap();
        assert_eq!(lo, Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        assert_eq!(hi, Utc.with_ymd_and_hms(2024, 1, 1, 8, 2, 0).unwrap());
    }
}

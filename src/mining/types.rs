// src/mining/types.rs — Value types shared by the miners

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// State values that never count as a real device state.
pub const NOISE_STATES: &[&str] = &["", "unknown", "unavailable", "none", "null"];

/// Trim and lowercase a raw state value.
pub fn normalize_state(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `true` for states carrying no information. Expects a normalized value.
pub fn is_noise(state: &str) -> bool {
    NOISE_STATES.contains(&state)
}

/// The `light` in `light.kitchen`. Empty when the id has no domain part.
pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(d, _)| d).unwrap_or("")
}

/// Calendar day of an instant in the configured zone.
pub fn local_date(ts: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// One state record as delivered by the Home Assistant history API.
///
/// Fields are loose on purpose: validation happens when the record is
/// parsed into a [`Snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub state: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl StateRecord {
    pub fn new(entity_id: &str, state: &str, last_changed: &str) -> Self {
        Self {
            entity_id: Some(entity_id.to_string()),
            state: serde_json::Value::String(state.to_string()),
            last_changed: Some(last_changed.to_string()),
            last_updated: None,
        }
    }

    /// The state as text. Null becomes the empty string.
    pub fn state_text(&self) -> String {
        match &self.state {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// `last_changed`, falling back to `last_updated`.
    pub fn timestamp_text(&self) -> Option<&str> {
        self.last_changed
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.last_updated.as_deref())
    }
}

/// A validated state observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub entity_id: String,
    /// Normalized (trimmed, lowercased) state.
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

/// A change of state of one entity.
///
/// Invariant: `from_state != to_state` and neither is a noise value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub entity_id: String,
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
}

impl Transition {
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }
}

/// A `(weekday, hour)` bucket. Weekday 0 is Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlotKey {
    pub weekday: u8,
    pub hour: u8,
}

impl TimeSlotKey {
    pub fn new(weekday: u8, hour: u8) -> Option<Self> {
        (weekday < 7 && hour < 24).then_some(Self { weekday, hour })
    }

    /// Slot of an instant, in the given zone.
    pub fn of(ts: &DateTime<Utc>, tz: &Tz) -> Self {
        let local = ts.with_timezone(tz);
        Self {
            weekday: local.weekday().num_days_from_monday() as u8,
            hour: local.hour() as u8,
        }
    }
}

impl fmt::Display for TimeSlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.weekday, self.hour)
    }
}

impl FromStr for TimeSlotKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| format!("slot key '{s}' is not 'weekday:hour'"))?;
        let weekday: u8 = w.trim().parse().map_err(|_| format!("bad weekday in '{s}'"))?;
        let hour: u8 = h.trim().parse().map_err(|_| format!("bad hour in '{s}'"))?;
        Self::new(weekday, hour).ok_or_else(|| format!("slot key '{s}' out of range"))
    }
}

// Slot keys are map keys in the persisted model, so they travel as "w:h".
impl Serialize for TimeSlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeSlotKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Day sets for one entity within one scope (a slot, or global).
///
/// Invariant: every `state_days[s]` is a subset of `entity_days`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStat {
    pub entity_days: BTreeSet<NaiveDate>,
    pub state_days: BTreeMap<String, BTreeSet<NaiveDate>>,
}

impl DayStat {
    pub fn record(&mut self, to_state: &str, day: NaiveDate) {
        self.entity_days.insert(day);
        self.state_days
            .entry(to_state.to_string())
            .or_default()
            .insert(day);
    }

    pub fn active_days(&self) -> usize {
        self.entity_days.len()
    }

    pub fn support(&self, state: &str) -> usize {
        self.state_days.get(state).map_or(0, BTreeSet::len)
    }

    /// `support / active_days`; `None` when the entity was never active.
    pub fn confidence(&self, state: &str) -> Option<f64> {
        let active = self.active_days();
        (active > 0).then(|| self.support(state) as f64 / active as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_noise_states() {
        assert!(is_noise(""));
        assert!(is_noise("unavailable"));
        assert!(is_noise(&normalize_state("  Unknown ")));
        assert!(!is_noise("on"));
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("light.kitchen"), "light");
        assert_eq!(domain_of("sensor.temp.inner"), "sensor");
        assert_eq!(domain_of("nodomain"), "");
    }

    #[test]
    fn test_slot_of_respects_time_zone() {
        // Monday 2024-01-01 23:30 UTC is Tuesday 02:30 in Moscow.
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        assert_eq!(TimeSlotKey::of(&ts, &Tz::UTC), TimeSlotKey::new(0, 23).unwrap());
        assert_eq!(
            TimeSlotKey::of(&ts, &Tz::Europe__Moscow),
            TimeSlotKey::new(1, 2).unwrap()
        );
        assert_eq!(
            local_date(&ts, &Tz::Europe__Moscow),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_slot_key_text_form() {
        let key = TimeSlotKey::new(4, 18).unwrap();
        assert_eq!(key.to_string(), "4:18");
        assert_eq!("4:18".parse::<TimeSlotKey>().unwrap(), key);
        assert!("7:00".parse::<TimeSlotKey>().is_err());
        assert!("4-18".parse::<TimeSlotKey>().is_err());
        assert!(TimeSlotKey::new(0, 24).is_none());
    }

    #[test]
    fn test_slot_key_as_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(TimeSlotKey::new(0, 8).unwrap(), 1u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"0:8":1}"#);
        let back: BTreeMap<TimeSlotKey, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_day_stat_confidence() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let mut stat = DayStat::default();
        assert_eq!(stat.confidence("on"), None);

        stat.record("on", d1);
        stat.record("on", d1);
        stat.record("off", d2);
        assert_eq!(stat.active_days(), 2);
        assert_eq!(stat.support("on"), 1);
        assert_eq!(stat.confidence("on"), Some(0.5));
        assert_eq!(stat.confidence("dim"), Some(0.0));
    }

    #[test]
    fn test_state_record_text_forms() {
        let mut rec = StateRecord::new("sensor.t", "21.5", "2024-01-01T00:00:00Z");
        assert_eq!(rec.state_text(), "21.5");
        rec.state = serde_json::json!(22);
        assert_eq!(rec.state_text(), "22");
        rec.state = serde_json::Value::Null;
        assert_eq!(rec.state_text(), "");

        rec.last_changed = Some(" ".into());
        rec.last_updated = Some("2024-01-02T00:00:00Z".into());
        assert_eq!(rec.timestamp_text(), Some("2024-01-02T00:00:00Z"));
    }
}

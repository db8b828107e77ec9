// src/source/mod.rs — Where training history comes from

pub mod home_assistant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::infra::errors::EngineError;
use crate::mining::StateRecord;

pub use home_assistant::HomeAssistantSource;

/// A provider of raw state history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistorySource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StateRecord>, EngineError>;
}

/// Accepted shapes of a history document.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryDocument {
    /// One list per entity, as returned by `/api/history/period`.
    Nested(Vec<Vec<StateRecord>>),
    Flat(Vec<StateRecord>),
}

/// Parse either a per-entity nested history or a flat record list.
pub fn parse_history_json(raw: &str) -> Result<Vec<StateRecord>, EngineError> {
    match serde_json::from_str::<HistoryDocument>(raw) {
        Ok(HistoryDocument::Nested(lists)) => Ok(lists.into_iter().flatten().collect()),
        Ok(HistoryDocument::Flat(records)) => Ok(records),
        Err(_) => Err(EngineError::Serialization(
            "expected a list of state records or a list of per-entity lists".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_history() {
        let raw = r#"[
            [{"entity_id": "light.a", "state": "on", "last_changed": "2024-01-01T08:00:00Z"},
             {"entity_id": "light.a", "state": "off", "last_changed": "2024-01-01T09:00:00Z"}],
            [{"entity_id": "sensor.t", "state": 21.5, "last_updated": "2024-01-01T08:00:00Z",
              "attributes": {"unit_of_measurement": "°C"}}]
        ]"#;
        let records = parse_history_json(raw).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].state_text(), "21.5");
        assert_eq!(records[2].timestamp_text(), Some("2024-01-01T08:00:00Z"));
    }

    #[test]
    fn test_parse_flat_history() {
        let raw = r#"[{"entity_id": "light.a", "state": "on", "last_changed": "2024-01-01T08:00:00Z"}]"#;
        let records = parse_history_json(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_id.as_deref(), Some("light.a"));
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_history_json("[]").unwrap().is_empty());
        assert!(matches!(
            parse_history_json(r#"{"entity_id": "light.a"}"#).unwrap_err(),
            EngineError::Serialization(_)
        ));
    }
}

// src/mining/automation.rs — Declarative Home Assistant automation documents

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::infra::errors::EngineError;

/// An automation in the shape Home Assistant's `automations.yaml` expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: Vec<Trigger>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub condition: Vec<Condition>,
    pub action: Vec<ServiceCall>,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub platform: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
}

impl Trigger {
    pub fn state(entity_id: &str, to: Option<&str>) -> Self {
        Self {
            platform: "state".into(),
            entity_id: entity_id.to_string(),
            to: to.map(str::to_string),
            above: None,
            below: None,
        }
    }

    pub fn numeric(entity_id: &str, above: Option<f64>, below: Option<f64>) -> Self {
        Self {
            platform: "numeric_state".into(),
            entity_id: entity_id.to_string(),
            to: None,
            above,
            below,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub condition: String,
    pub entity_id: String,
    pub state: Vec<String>,
}

impl Condition {
    pub fn state(entity_id: &str, states: &[String]) -> Self {
        Self {
            condition: "state".into(),
            entity_id: entity_id.to_string(),
            state: states.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub service: String,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub entity_id: String,
}

impl ServiceCall {
    pub fn new(service: &str, entity_id: &str) -> Self {
        Self {
            service: service.to_string(),
            target: Target {
                entity_id: entity_id.to_string(),
            },
            data: None,
        }
    }

    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
        self
    }
}

impl Automation {
    pub fn to_yaml(&self) -> Result<String, EngineError> {
        Ok(serde_yml::to_string(self)?)
    }
}

/// The service that drives `domain` into `state`, when one is known.
pub fn service_for_state(domain: &str, state: &str) -> Option<ServiceName> {
    let service = match (domain, state) {
        ("cover", "open") => "open_cover",
        ("cover", "closed") => "close_cover",
        ("lock", "locked") => "lock",
        ("lock", "unlocked") => "unlock",
        ("media_player", "playing") => "media_play",
        ("media_player", "paused") => "media_pause",
        ("climate", "heat" | "cool" | "heat_cool" | "auto" | "dry" | "fan_only") => {
            return Some(ServiceName {
                service: "climate.set_hvac_mode".into(),
                data: Some(("hvac_mode", serde_json::Value::String(state.into()))),
            });
        }
        (_, "on") => "turn_on",
        (_, "off") => "turn_off",
        _ => return None,
    };
    Some(ServiceName {
        service: format!("{domain}.{service}"),
        data: None,
    })
}

/// A resolved service plus an optional single data field.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceName {
    pub service: String,
    pub data: Option<(&'static str, serde_json::Value)>,
}

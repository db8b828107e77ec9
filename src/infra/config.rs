// src/infra/config.rs — Configuration loading (TOML + environment overrides)

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub mining: MiningConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on every API call when set.
    pub token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8090,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
    /// Keep the model in memory only.
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Overrides the backend's default file location.
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(p), _) => PathBuf::from(p),
            (None, StorageBackend::Json) => paths::model_json_path(),
            (None, _) => paths::model_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://supervisor/core/api".into(),
            token: None,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Local hour (0-23) at which the nightly retraining runs.
    pub train_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            train_hour: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Thresholds and vocabularies for every miner.
///
/// Values coming from files, env vars or API requests are never rejected;
/// [`MiningConfig::clamped`] pulls them into range once at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// How far back the history source is queried.
    pub history_days: u32,
    pub min_support: u32,
    pub min_confidence: f64,
    pub prediction_limit: usize,
    /// Entity-domain allow-list applied before extraction. Empty = all.
    pub enabled_domains: Vec<String>,
    /// IANA zone used for weekday/hour slots and calendar days.
    pub timezone: String,
    pub routine_min_support_days: u32,
    pub routine_min_confidence: f64,
    pub arrival_to_door_minutes: u32,
    pub door_to_light_minutes: u32,
    pub sequence_window_minutes: u32,
    pub sequence_min_support_days: u32,
    pub sequence_min_confidence: f64,
    pub sequence_limit: usize,
    pub routine: RoutineVocabulary,
    pub sequence: SequenceVocabulary,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            history_days: 14,
            min_support: 5,
            min_confidence: 0.6,
            prediction_limit: 10,
            enabled_domains: Vec::new(),
            timezone: "UTC".into(),
            routine_min_support_days: 3,
            routine_min_confidence: 0.4,
            arrival_to_door_minutes: 20,
            door_to_light_minutes: 20,
            sequence_window_minutes: 30,
            sequence_min_support_days: 3,
            sequence_min_confidence: 0.35,
            sequence_limit: 20,
            routine: RoutineVocabulary::default(),
            sequence: SequenceVocabulary::default(),
        }
    }
}

/// Match predicates for the arrival -> door -> light chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineVocabulary {
    pub tracker_domain: String,
    pub home_states: Vec<String>,
    pub door_domains: Vec<String>,
    /// Substrings of the entity id that mark an entry door.
    pub door_name_patterns: Vec<String>,
    pub door_open_states: Vec<String>,
    pub light_domain: String,
    pub light_on_states: Vec<String>,
}

impl Default for RoutineVocabulary {
    fn default() -> Self {
        Self {
            tracker_domain: "device_tracker".into(),
            home_states: vec!["home".into(), "дом".into()],
            door_domains: vec![
                "binary_sensor".into(),
                "lock".into(),
                "sensor".into(),
                "cover".into(),
            ],
            door_name_patterns: vec!["door".into(), "entry".into(), "front".into()],
            door_open_states: vec!["on".into(), "open".into(), "unlocked".into()],
            light_domain: "light".into(),
            light_on_states: vec!["on".into()],
        }
    }
}

/// Trigger and action vocabularies for the sequence miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceVocabulary {
    /// Domains whose transitions count as user actions.
    pub action_domains: Vec<String>,
    /// Domains allowed as triggers. Empty = any domain.
    pub trigger_domains: Vec<String>,
    /// Bucket width for numeric trigger values.
    pub numeric_bucket_size: f64,
    /// Rounding step for climate set-points.
    pub setpoint_granularity: f64,
}

impl Default for SequenceVocabulary {
    fn default() -> Self {
        Self {
            action_domains: [
                "light",
                "switch",
                "climate",
                "cover",
                "fan",
                "lock",
                "media_player",
                "input_boolean",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            trigger_domains: Vec::new(),
            numeric_bucket_size: 1.0,
            setpoint_granularity: 0.5,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

fn normalize_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

impl MiningConfig {
    /// Pull every threshold into its valid range and normalize vocabularies.
    pub fn clamped(&self) -> Self {
        let defaults = SequenceVocabulary::default();
        Self {
            history_days: self.history_days.max(1),
            min_support: self.min_support,
            min_confidence: clamp_unit(self.min_confidence),
            prediction_limit: self.prediction_limit.max(1),
            enabled_domains: normalize_list(&self.enabled_domains),
            timezone: self.timezone.trim().to_string(),
            routine_min_support_days: self.routine_min_support_days,
            routine_min_confidence: clamp_unit(self.routine_min_confidence),
            arrival_to_door_minutes: self.arrival_to_door_minutes,
            door_to_light_minutes: self.door_to_light_minutes,
            sequence_window_minutes: self.sequence_window_minutes,
            sequence_min_support_days: self.sequence_min_support_days,
            sequence_min_confidence: clamp_unit(self.sequence_min_confidence),
            sequence_limit: self.sequence_limit.max(1),
            routine: RoutineVocabulary {
                tracker_domain: self.routine.tracker_domain.trim().to_lowercase(),
                home_states: normalize_list(&self.routine.home_states),
                door_domains: normalize_list(&self.routine.door_domains),
                door_name_patterns: normalize_list(&self.routine.door_name_patterns),
                door_open_states: normalize_list(&self.routine.door_open_states),
                light_domain: self.routine.light_domain.trim().to_lowercase(),
                light_on_states: normalize_list(&self.routine.light_on_states),
            },
            sequence: SequenceVocabulary {
                action_domains: normalize_list(&self.sequence.action_domains),
                trigger_domains: normalize_list(&self.sequence.trigger_domains),
                numeric_bucket_size: positive_or(
                    self.sequence.numeric_bucket_size,
                    defaults.numeric_bucket_size,
                ),
                setpoint_granularity: positive_or(
                    self.sequence.setpoint_granularity,
                    defaults.setpoint_granularity,
                ),
            },
        }
    }

    /// Resolve the configured zone, falling back to UTC for unknown names.
    pub fn time_zone(&self) -> Tz {
        match self.timezone.trim().parse::<Tz>() {
            Ok(tz) => tz,
            Err(e) => {
                tracing::warn!("Unknown time zone '{}' ({}), using UTC", self.timezone, e);
                Tz::UTC
            }
        }
    }

    /// Whether an entity domain passes the `enabled_domains` allow-list.
    pub fn domain_enabled(&self, domain: &str) -> bool {
        self.enabled_domains.is_empty() || self.enabled_domains.iter().any(|d| d == domain)
    }
}

impl Config {
    /// Load config from file, falling back to defaults, then apply env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment-style overrides. Unparseable values are ignored
    /// with a warning rather than failing startup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("SUPERVISOR_TOKEN") {
            self.home_assistant.token = Some(v);
        }
        if let Some(v) = lookup("MIN_SUPPORT") {
            match v.trim().parse() {
                Ok(n) => self.mining.min_support = n,
                Err(_) => tracing::warn!("Ignoring MIN_SUPPORT={v}: not an integer"),
            }
        }
        if let Some(v) = lookup("MIN_CONFIDENCE") {
            match v.trim().parse() {
                Ok(n) => self.mining.min_confidence = n,
                Err(_) => tracing::warn!("Ignoring MIN_CONFIDENCE={v}: not a number"),
            }
        }
        if let Some(v) = lookup("HISTORY_DAYS") {
            match v.trim().parse() {
                Ok(n) => self.mining.history_days = n,
                Err(_) => tracing::warn!("Ignoring HISTORY_DAYS={v}: not an integer"),
            }
        }
        if let Some(v) = lookup("TRAIN_HOUR") {
            match v.trim().parse::<u32>() {
                Ok(n) => self.schedule.train_hour = n.min(23),
                Err(_) => tracing::warn!("Ignoring TRAIN_HOUR={v}: not an integer"),
            }
        }
    }
}

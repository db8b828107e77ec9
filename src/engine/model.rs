// src/engine/model.rs — Immutable trained model and its metadata

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::progress::TrainingStage;
use crate::infra::config::MiningConfig;
use crate::infra::errors::EngineError;
use crate::mining::{
    detect_routines, extract, mine_sequences, predict, suggest_routines, suggest_sequences,
    Prediction, RoutineChain, RoutineSuggestion, SequenceRule, SequenceSuggestion, StateRecord,
    Statistics, TimeSlotKey,
};

/// Bumped whenever the persisted layout changes incompatibly.
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCounts {
    pub records: usize,
    pub accepted: usize,
    pub skipped_count: usize,
    pub filtered: usize,
    pub transitions: usize,
    pub entities: usize,
    pub domains: usize,
    pub slots: usize,
    pub routine_chains: usize,
    pub sequence_rules: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub window: Option<TrainingWindow>,
    pub timezone: String,
    pub counts: ModelCounts,
    /// Clamped config the model was trained with.
    pub config: MiningConfig,
}

/// Returned from a successful training pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub trained_at: DateTime<Utc>,
    pub window: Option<TrainingWindow>,
    pub counts: ModelCounts,
    pub duration_ms: u64,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub metadata: ModelMetadata,
    pub statistics: Statistics,
    pub routines: Vec<RoutineChain>,
    pub sequences: Vec<SequenceRule>,
}

impl Model {
    /// Run every miner over `records`.
    ///
    /// `on_stage` is called as each stage begins.
    pub fn build(
        records: &[StateRecord],
        config: &MiningConfig,
        trained_at: DateTime<Utc>,
        on_stage: &dyn Fn(TrainingStage),
    ) -> Result<Self, EngineError> {
        let config = config.clamped();
        let tz = config.time_zone();

        on_stage(TrainingStage::Extracting);
        if records.is_empty() {
            tracing::warn!("Training on empty input; the model will hold no patterns");
        }
        let extraction = extract(records, &config);
        if !records.is_empty() && extraction.skipped == records.len() {
            return Err(EngineError::InvalidInput(format!(
                "all {} records were rejected",
                records.len()
            )));
        }

        on_stage(TrainingStage::Statistics);
        let statistics = Statistics::from_transitions(&extraction.transitions, &tz);

        on_stage(TrainingStage::Routines);
        let timeline = extraction.timeline();
        let routines = detect_routines(&timeline, &config);

        on_stage(TrainingStage::Sequences);
        let sequences = mine_sequences(&timeline, &config);

        let counts = ModelCounts {
            records: records.len(),
            accepted: extraction.accepted,
            skipped_count: extraction.skipped,
            filtered: extraction.filtered,
            transitions: extraction.transitions.len(),
            entities: extraction.entities.len(),
            domains: extraction.domains().len(),
            slots: statistics.slot_count(),
            routine_chains: routines.len(),
            sequence_rules: sequences.len(),
        };

        Ok(Self {
            metadata: ModelMetadata {
                format_version: MODEL_FORMAT_VERSION,
                trained_at,
                window: extraction
                    .window
                    .map(|(start, end)| TrainingWindow { start, end }),
                timezone: tz.name().to_string(),
                counts,
                config,
            },
            statistics,
            routines,
            sequences,
        })
    }

    /// Zone the model was trained in; slots are only meaningful in it.
    pub fn time_zone(&self) -> Tz {
        self.metadata.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn predict(&self, at: DateTime<Utc>, config: &MiningConfig) -> Vec<Prediction> {
        let slot = TimeSlotKey::of(&at, &self.time_zone());
        predict(&self.statistics, slot, &config.clamped())
    }

    pub fn routine_suggestions(
        &self,
        config: &MiningConfig,
    ) -> Result<Vec<RoutineSuggestion>, EngineError> {
        suggest_routines(&self.routines, &config.clamped())
    }

    pub fn sequence_suggestions(
        &self,
        config: &MiningConfig,
    ) -> Result<Vec<SequenceSuggestion>, EngineError> {
        suggest_sequences(
            &self.sequences,
            self.metadata.config.sequence_window_minutes,
            &config.clamped(),
        )
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let model: Model = serde_json::from_str(raw)?;
        if model.metadata.format_version > MODEL_FORMAT_VERSION {
            return Err(EngineError::Serialization(format!(
                "model format {} is newer than supported version {}",
                model.metadata.format_version, MODEL_FORMAT_VERSION
            )));
        }
        Ok(model)
    }

    pub fn summary(&self, duration_ms: u64, persisted: bool) -> TrainingSummary {
        TrainingSummary {
            trained_at: self.metadata.trained_at,
            window: self.metadata.window,
            counts: self.metadata.counts.clone(),
            duration_ms,
            persisted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<StateRecord> {
        vec![
            StateRecord::new("light.kitchen", "off", "2024-01-01T07:00:00Z"),
            StateRecord::new("light.kitchen", "on", "2024-01-01T08:05:00Z"),
            StateRecord::new("light.kitchen", "off", "2024-01-01T09:00:00Z"),
            StateRecord::new("", "on", "2024-01-01T09:00:00Z"),
        ]
    }

    #[test]
    fn test_build_counts() {
        let model = Model::build(&records(), &MiningConfig::default(), Utc::now(), &|_| {})
            .unwrap();
        let counts = &model.metadata.counts;
        assert_eq!(counts.records, 4);
        assert_eq!(counts.accepted, 3);
        assert_eq!(counts.skipped_count, 1);
        assert_eq!(counts.transitions, 2);
        assert_eq!(counts.entities, 1);
        assert_eq!(counts.domains, 1);
        assert_eq!(model.metadata.timezone, "UTC");
        assert!(model.metadata.window.is_some());
    }

    #[test]
    fn test_all_rejected_is_invalid_input() {
        let bad = vec![
            StateRecord::new("nodot", "on", "2024-01-01T07:00:00Z"),
            StateRecord::new("light.a", "on", "not a time"),
        ];
        let err = Model::build(&bad, &MiningConfig::default(), Utc::now(), &|_| {}).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_input_builds_empty_model() {
        let model = Model::build(&[], &MiningConfig::default(), Utc::now(), &|_| {}).unwrap();
        assert!(model.statistics.is_empty());
        assert!(model.metadata.window.is_none());
    }

    #[test]
    fn test_sequence_window_reported_from_training() {
        let mut history = Vec::new();
        for day in 1..=3 {
            history.push(StateRecord::new("binary_sensor.motion", "off", &format!("2024-01-0{day}T06:00:00Z")));
            history.push(StateRecord::new("binary_sensor.motion", "on", &format!("2024-01-0{day}T07:00:00Z")));
            history.push(StateRecord::new("light.desk", "off", &format!("2024-01-0{day}T06:30:00Z")));
            history.push(StateRecord::new("light.desk", "on", &format!("2024-01-0{day}T07:40:00Z")));
        }
        let trained_with = MiningConfig {
            sequence_window_minutes: 45,
            ..MiningConfig::default()
        };
        let model = Model::build(&history, &trained_with, Utc::now(), &|_| {}).unwrap();

        let suggestions = model.sequence_suggestions(&MiningConfig::default()).unwrap();
        let motion = suggestions
            .iter()
            .find(|s| s.trigger.entity_id() == "binary_sensor.motion")
            .unwrap();
        assert_eq!(motion.action.entity_id(), "light.desk");
        assert_eq!(motion.window_minutes, 45);
    }

    #[test]
    fn test_stage_callback_order() {
        let seen = std::cell::RefCell::new(Vec::new());
        Model::build(&records(), &MiningConfig::default(), Utc::now(), &|s| {
            seen.borrow_mut().push(s)
        })
        .unwrap();
        assert_eq!(
            seen.into_inner(),
            vec![
                TrainingStage::Extracting,
                TrainingStage::Statistics,
                TrainingStage::Routines,
                TrainingStage::Sequences,
            ]
        );
    }

    #[test]
    fn test_json_roundtrip_and_version_check() {
        let model = Model::build(&records(), &MiningConfig::default(), Utc::now(), &|_| {})
            .unwrap();
        let json = model.to_json().unwrap();
        assert_eq!(Model::from_json(&json).unwrap(), model);

        let mut future = model.clone();
        future.metadata.format_version = MODEL_FORMAT_VERSION + 1;
        let err = Model::from_json(&future.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
        assert!(matches!(
            Model::from_json("{not json").unwrap_err(),
            EngineError::Serialization(_)
        ));
    }
}

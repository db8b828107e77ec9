// src/engine/mod.rs — Model container: train, query, persist

pub mod model;
pub mod progress;

pub use model::{Model, ModelCounts, ModelMetadata, TrainingSummary, TrainingWindow};
pub use progress::{TrainingProgress, TrainingStage};

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::Instant;

use crate::infra::config::MiningConfig;
use crate::infra::errors::EngineError;
use crate::mining::{Prediction, RoutineSuggestion, SequenceSuggestion, StateRecord};
use crate::storage::{JsonFileStore, ModelStore};
use progress::ProgressGuard;

/// Holds the current model and serializes training.
///
/// Readers clone the `Arc<Model>` once and work on that snapshot, so a
/// concurrent retrain never changes a result halfway through a query.
/// Training builds the new model without holding the read/write lock and
/// swaps it in under a short write guard.
pub struct Engine {
    current: RwLock<Option<Arc<Model>>>,
    train_gate: Mutex<()>,
    progress: Mutex<Option<TrainingProgress>>,
    store: Option<Arc<dyn ModelStore>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            train_gate: Mutex::new(()),
            progress: Mutex::new(None),
            store: None,
        }
    }

    /// Persist every trained model to `store` and restore from it.
    pub fn with_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load the last persisted model, if a store is attached and holds one.
    ///
    /// On failure the engine keeps whatever it had (normally nothing).
    pub fn restore(&self) -> Result<bool, EngineError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load()? {
            Some(model) => {
                tracing::info!(
                    "Restored model trained at {} from {}",
                    model.metadata.trained_at,
                    store.describe()
                );
                self.install(model);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Train and wait for any training already running.
    pub fn train(
        &self,
        records: &[StateRecord],
        config: &MiningConfig,
    ) -> Result<TrainingSummary, EngineError> {
        let gate = self.train_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.train_locked(gate, records, config)
    }

    /// Train unless another pass is already running.
    pub fn try_train(
        &self,
        records: &[StateRecord],
        config: &MiningConfig,
    ) -> Result<TrainingSummary, EngineError> {
        let gate = match self.train_gate.try_lock() {
            Ok(gate) => gate,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(EngineError::TrainingInProgress),
        };
        self.train_locked(gate, records, config)
    }

    fn train_locked(
        &self,
        _gate: MutexGuard<'_, ()>,
        records: &[StateRecord],
        config: &MiningConfig,
    ) -> Result<TrainingSummary, EngineError> {
        let started = Instant::now();
        let guard = ProgressGuard::start(&self.progress);

        let model = Model::build(records, config, Utc::now(), &|stage| guard.advance(stage))?;

        let persisted = match &self.store {
            Some(store) => {
                guard.advance(TrainingStage::Persisting);
                match store.save(&model) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("Failed to persist model to {}: {}", store.describe(), e);
                        false
                    }
                }
            }
            None => false,
        };

        let summary = model.summary(started.elapsed().as_millis() as u64, persisted);
        tracing::info!(
            "Trained on {} records: {} transitions, {} entities, {} skipped in {}ms",
            summary.counts.records,
            summary.counts.transitions,
            summary.counts.entities,
            summary.counts.skipped_count,
            summary.duration_ms
        );
        self.install(model);
        Ok(summary)
    }

    fn install(&self, model: Model) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(model));
    }

    /// The current model, if any.
    pub fn snapshot(&self) -> Option<Arc<Model>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_model(&self) -> Result<Arc<Model>, EngineError> {
        self.snapshot().ok_or(EngineError::NotTrained)
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Predictions for `at` (default: now).
    pub fn predict(
        &self,
        at: Option<DateTime<Utc>>,
        config: &MiningConfig,
    ) -> Result<Vec<Prediction>, EngineError> {
        let model = self.require_model()?;
        Ok(model.predict(at.unwrap_or_else(Utc::now), config))
    }

    pub fn routine_suggestions(
        &self,
        config: &MiningConfig,
    ) -> Result<Vec<RoutineSuggestion>, EngineError> {
        self.require_model()?.routine_suggestions(config)
    }

    pub fn sequence_suggestions(
        &self,
        config: &MiningConfig,
    ) -> Result<Vec<SequenceSuggestion>, EngineError> {
        self.require_model()?.sequence_suggestions(config)
    }

    pub fn info(&self) -> Result<ModelMetadata, EngineError> {
        Ok(self.require_model()?.metadata.clone())
    }

    /// Stage and rough percentage of a running training pass.
    pub fn progress(&self) -> Option<TrainingProgress> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write the current model as JSON to `path`.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let model = self.require_model()?;
        JsonFileStore::new(path).save(&model)
    }

    /// Replace the current model with the one stored at `path`.
    ///
    /// A missing or corrupt file leaves the current model untouched.
    pub fn load(&self, path: &Path) -> Result<(), EngineError> {
        let model = JsonFileStore::new(path).load()?.ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no model at {}", path.display()),
            ))
        })?;
        self.install(model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<StateRecord> {
        vec![
            StateRecord::new("light.kitchen", "off", "2024-01-01T07:00:00Z"),
            StateRecord::new("light.kitchen", "on", "2024-01-01T08:05:00Z"),
        ]
    }

    #[test]
    fn test_queries_before_training() {
        let engine = Engine::new();
        let config = MiningConfig::default();
        assert!(!engine.is_trained());
        assert!(matches!(
            engine.predict(None, &config).unwrap_err(),
            EngineError::NotTrained
        ));
        assert!(matches!(engine.info().unwrap_err(), EngineError::NotTrained));
        assert!(matches!(
            engine.routine_suggestions(&config).unwrap_err(),
            EngineError::NotTrained
        ));
        assert!(matches!(
            engine.sequence_suggestions(&config).unwrap_err(),
            EngineError::NotTrained
        ));
    }

    #[test]
    fn test_train_installs_model_and_clears_progress() {
        let engine = Engine::new();
        let summary = engine.train(&records(), &MiningConfig::default()).unwrap();
        assert_eq!(summary.counts.transitions, 1);
        assert!(!summary.persisted);
        assert!(engine.is_trained());
        assert!(engine.progress().is_none());
        assert_eq!(engine.info().unwrap().counts.records, 2);
    }

    #[test]
    fn test_failed_training_keeps_previous_model() {
        let engine = Engine::new();
        engine.train(&records(), &MiningConfig::default()).unwrap();
        let before = engine.snapshot().unwrap();

        let bad = vec![StateRecord::new("light.a", "on", "garbage")];
        let err = engine.train(&bad, &MiningConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(Arc::ptr_eq(&before, &engine.snapshot().unwrap()));
        assert!(engine.progress().is_none());
    }

    #[test]
    fn test_try_train_reports_busy() {
        let engine = Engine::new();
        let _held = engine.train_gate.lock().unwrap();
        let err = engine
            .try_train(&records(), &MiningConfig::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::TrainingInProgress));
        assert!(err.is_retriable());
    }

    #[test]
    fn test_snapshot_survives_retrain() {
        let engine = Engine::new();
        engine.train(&records(), &MiningConfig::default()).unwrap();
        let old = engine.snapshot().unwrap();
        engine.train(&[], &MiningConfig::default()).unwrap();
        assert_eq!(old.metadata.counts.records, 2);
        assert_eq!(engine.info().unwrap().counts.records, 0);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let engine = Engine::new();
        assert!(matches!(
            engine.save(&path).unwrap_err(),
            EngineError::NotTrained
        ));
        engine.train(&records(), &MiningConfig::default()).unwrap();
        engine.save(&path).unwrap();

        let fresh = Engine::new();
        fresh.load(&path).unwrap();
        assert_eq!(fresh.info().unwrap(), engine.info().unwrap());

        let missing = Engine::new();
        assert!(missing.load(&dir.path().join("nope.json")).is_err());
        assert!(!missing.is_trained());
    }

    #[test]
    fn test_store_receives_trained_model() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ModelStore> = Arc::new(JsonFileStore::new(dir.path().join("m.json")));

        let engine = Engine::new().with_store(store.clone());
        assert!(!engine.restore().unwrap());
        let summary = engine.train(&records(), &MiningConfig::default()).unwrap();
        assert!(summary.persisted);

        let restarted = Engine::new().with_store(store);
        assert!(restarted.restore().unwrap());
        assert!(restarted.is_trained());
    }
}

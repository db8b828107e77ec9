// src/engine/progress.rs — Advisory training progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Training stages in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStage {
    Extracting,
    Statistics,
    Routines,
    Sequences,
    Persisting,
}

impl TrainingStage {
    /// Rough completion percentage when the stage starts.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Extracting => 0,
            Self::Statistics => 30,
            Self::Routines => 55,
            Self::Sequences => 75,
            Self::Persisting => 95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub stage: TrainingStage,
    pub percent: u8,
    pub started_at: DateTime<Utc>,
}

/// Holds the current progress and clears it when dropped, so a failed or
/// panicking training pass never leaves a stale stage behind.
pub(crate) struct ProgressGuard<'a> {
    slot: &'a Mutex<Option<TrainingProgress>>,
    started_at: DateTime<Utc>,
}

impl<'a> ProgressGuard<'a> {
    pub(crate) fn start(slot: &'a Mutex<Option<TrainingProgress>>) -> Self {
        let guard = Self {
            slot,
            started_at: Utc::now(),
        };
        guard.advance(TrainingStage::Extracting);
        guard
    }

    pub(crate) fn advance(&self, stage: TrainingStage) {
        tracing::debug!(?stage, "training stage");
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(TrainingProgress {
            stage,
            percent: stage.percent(),
            started_at: self.started_at,
        });
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

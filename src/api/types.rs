// src/api/types.rs

use crate::engine::TrainingProgress;
use crate::mining::{Prediction, StateRecord, TimeSlotKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for training. Without `records` the configured history
/// source is queried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub records: Option<Vec<StateRecord>>,
}

/// Request body for predictions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Timestamp to predict for; now when absent.
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub at: DateTime<Utc>,
    pub slot: TimeSlotKey,
    pub predictions: Vec<Prediction>,
}

/// A list of suggestions with its length.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionList<T> {
    pub count: usize,
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for SuggestionList<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// Health response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub trained: bool,
    pub training: Option<TrainingProgress>,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Whether retrying the same request later may succeed.
    #[serde(default)]
    pub retriable: bool,
}

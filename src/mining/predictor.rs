// src/mining/predictor.rs — Ranked predictions with cascading fallback

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::stats::Statistics;
use super::types::{DayStat, TimeSlotKey};
use crate::infra::config::MiningConfig;

/// Which cascade stage produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    /// Slot statistics, full thresholds
    TimeSlot,
    /// Slot statistics, support relaxed to 1
    TimeSlotRelaxed,
    /// Global statistics, full thresholds
    Global,
    /// Global statistics, support relaxed to 1
    GlobalRelaxed,
}

impl PredictionSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TimeSlot => "time_slot",
            Self::TimeSlotRelaxed => "time_slot_relaxed",
            Self::Global => "global",
            Self::GlobalRelaxed => "global_relaxed",
        }
    }
}

/// One predicted `(entity, state)` for the queried moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub entity_id: String,
    pub state: String,
    pub confidence: f64,
    pub support: usize,
    pub source: PredictionSource,
}

/// Predict likely transitions for `slot`.
///
/// Stages run in order and the first stage to produce an `(entity, state)`
/// pair wins it. Once `prediction_limit` candidates are collected the
/// remaining stages are skipped, so relaxed candidates can never displace
/// full-threshold ones.
pub fn predict(stats: &Statistics, slot: TimeSlotKey, config: &MiningConfig) -> Vec<Prediction> {
    let limit = config.prediction_limit.max(1);
    let min_support = config.min_support as usize;
    let empty = BTreeMap::new();
    let slot_stats = stats.slot(&slot).unwrap_or(&empty);

    let stages: [(PredictionSource, &BTreeMap<String, DayStat>, usize); 4] = [
        (PredictionSource::TimeSlot, slot_stats, min_support),
        (PredictionSource::TimeSlotRelaxed, slot_stats, 1),
        (PredictionSource::Global, &stats.global, min_support),
        (PredictionSource::GlobalRelaxed, &stats.global, 1),
    ];

    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    let mut out: Vec<Prediction> = Vec::new();

    for (source, scope, support_floor) in stages {
        if out.len() >= limit {
            break;
        }
        for (entity_id, stat) in scope {
            for (state, days) in &stat.state_days {
                let support = days.len();
                let Some(confidence) = stat.confidence(state) else {
                    continue;
                };
                if support < support_floor || confidence < config.min_confidence {
                    continue;
                }
                if !seen.insert((entity_id.clone(), state.clone())) {
                    continue;
                }
                out.push(Prediction {
                    entity_id: entity_id.clone(),
                    state: state.clone(),
                    confidence,
                    support,
                    source,
                });
            }
        }
    }

    rank(&mut out);
    out.truncate(limit);
    out
}

/// Confidence descending, then support descending; ids break the
/// remaining ties so output never depends on map order.
pub fn rank(predictions: &mut [Prediction]) {
    predictions.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.support.cmp(&a.support))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
            .then_with(|| a.state.cmp(&b.state))
    });
}

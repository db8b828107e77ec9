// src/mining/sequence.rs — Trigger -> action sequence mining

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::automation::{service_for_state, Automation, ServiceCall, Trigger};
use super::types::{domain_of, local_date, Transition};
use crate::infra::config::{MiningConfig, SequenceVocabulary};
use crate::infra::errors::EngineError;

/// Smallest change that counts as a numeric trend.
const TREND_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
}

/// What has to happen for a rule to fire.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Entity changed to a specific (non-numeric) state.
    State { entity_id: String, to: String },
    /// Numeric value moved in a direction and landed in a bucket.
    NumericTrend {
        entity_id: String,
        direction: TrendDirection,
        bucket: String,
    },
    /// Numeric value entered a bucket with no usable previous value.
    NumericState { entity_id: String, bucket: String },
}

/// What the user did afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    State { entity_id: String, to: String },
    SetTemperature { entity_id: String, target: String },
}

impl TriggerSpec {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::State { entity_id, .. }
            | Self::NumericTrend { entity_id, .. }
            | Self::NumericState { entity_id, .. } => entity_id,
        }
    }
}

impl ActionSpec {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::State { entity_id, .. } | Self::SetTemperature { entity_id, .. } => entity_id,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::State { to, .. } => to,
            Self::SetTemperature { target, .. } => target,
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State { entity_id, to } => write!(f, "{entity_id} to {to}"),
            Self::NumericTrend {
                entity_id,
                direction,
                bucket,
            } => {
                let dir = match direction {
                    TrendDirection::Up => "rises",
                    TrendDirection::Down => "falls",
                };
                write!(f, "{entity_id} {dir} to ~{bucket}")
            }
            Self::NumericState { entity_id, bucket } => write!(f, "{entity_id} at ~{bucket}"),
        }
    }
}

/// Day sets for one `(trigger, action)` pair.
///
/// Invariant: `matched_days ⊆ antecedent_days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRule {
    pub trigger: TriggerSpec,
    pub action: ActionSpec,
    /// Days the trigger occurred.
    pub antecedent_days: BTreeSet<NaiveDate>,
    /// Days the trigger was followed by this action inside the window.
    pub matched_days: BTreeSet<NaiveDate>,
}

impl SequenceRule {
    pub fn support(&self) -> usize {
        self.matched_days.len()
    }

    pub fn confidence(&self) -> f64 {
        if self.antecedent_days.is_empty() {
            0.0
        } else {
            self.matched_days.len() as f64 / self.antecedent_days.len() as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSuggestion {
    pub title: String,
    pub trigger: TriggerSpec,
    pub action: ActionSpec,
    pub confidence: f64,
    pub support: usize,
    pub antecedent_days: usize,
    pub window_minutes: u32,
    pub estimated_service: String,
    pub automation_yaml: String,
}

fn parse_number(state: &str) -> Option<f64> {
    state.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Round `value` to the nearest multiple of `step` and render it with just
/// enough decimals for the step.
fn bucket(value: f64, step: f64) -> String {
    let mut rounded = (value / step).round() * step;
    if rounded == 0.0 {
        rounded = 0.0; // no "-0"
    }
    let decimals = if step.fract() == 0.0 {
        0
    } else if (step * 10.0).fract().abs() < 1e-9 {
        1
    } else {
        2
    };
    format!("{rounded:.decimals$}")
}

/// Classify a transition as a trigger, if the vocabulary allows it.
pub fn trigger_spec(t: &Transition, vocab: &SequenceVocabulary) -> Option<TriggerSpec> {
    if !vocab.trigger_domains.is_empty() && !vocab.trigger_domains.iter().any(|d| d == t.domain())
    {
        return None;
    }

    let Some(curr) = parse_number(&t.to_state) else {
        return Some(TriggerSpec::State {
            entity_id: t.entity_id.clone(),
            to: t.to_state.clone(),
        });
    };

    let bucket = bucket(curr, vocab.numeric_bucket_size);
    match parse_number(&t.from_state) {
        Some(prev) if (curr - prev).abs() > TREND_EPSILON => Some(TriggerSpec::NumericTrend {
            entity_id: t.entity_id.clone(),
            direction: if curr > prev {
                TrendDirection::Up
            } else {
                TrendDirection::Down
            },
            bucket,
        }),
        _ => Some(TriggerSpec::NumericState {
            entity_id: t.entity_id.clone(),
            bucket,
        }),
    }
}

/// Classify a transition as a user action of a controllable domain.
pub fn action_spec(t: &Transition, vocab: &SequenceVocabulary) -> Option<ActionSpec> {
    let domain = t.domain();
    if !vocab.action_domains.iter().any(|d| d == domain) {
        return None;
    }

    if domain == "climate" {
        if let Some(value) = parse_number(&t.to_state) {
            return Some(ActionSpec::SetTemperature {
                entity_id: t.entity_id.clone(),
                target: bucket(value, vocab.setpoint_granularity),
            });
        }
    }

    Some(ActionSpec::State {
        entity_id: t.entity_id.clone(),
        to: t.to_state.clone(),
    })
}

/// Mine every `(trigger, action)` pair from a time-ordered timeline.
///
/// For each trigger occurrence the first action on another entity inside
/// `[t, t + sequence_window_minutes]` is paired with it. Actions stamped
/// the same instant as the trigger count regardless of their sort position.
pub fn mine_sequences(timeline: &[Transition], config: &MiningConfig) -> Vec<SequenceRule> {
    let tz = config.time_zone();
    let vocab = &config.sequence;
    let window = Duration::minutes(config.sequence_window_minutes as i64);

    let mut antecedent: BTreeMap<TriggerSpec, BTreeSet<NaiveDate>> = BTreeMap::new();
    let mut matched: BTreeMap<(TriggerSpec, ActionSpec), BTreeSet<NaiveDate>> = BTreeMap::new();

    for event in timeline {
        let Some(trigger) = trigger_spec(event, vocab) else {
            continue;
        };
        let day = local_date(&event.timestamp, &tz);
        antecedent.entry(trigger.clone()).or_default().insert(day);

        let deadline = event.timestamp + window;
        let from = timeline.partition_point(|t| t.timestamp < event.timestamp);
        let action = timeline[from..]
            .iter()
            .take_while(|next| next.timestamp <= deadline)
            .filter(|next| next.entity_id != event.entity_id)
            .find_map(|next| action_spec(next, vocab));

        if let Some(action) = action {
            matched.entry((trigger, action)).or_default().insert(day);
        }
    }

    matched
        .into_iter()
        .map(|((trigger, action), matched_days)| SequenceRule {
            antecedent_days: antecedent.get(&trigger).cloned().unwrap_or_default(),
            trigger,
            action,
            matched_days,
        })
        .collect()
}

/// Filter, rank and truncate rules, rendering an automation for each.
///
/// `mined_window_minutes` is the window the rules were mined with, which
/// may differ from the one in `config`.
pub fn suggest_sequences(
    rules: &[SequenceRule],
    mined_window_minutes: u32,
    config: &MiningConfig,
) -> Result<Vec<SequenceSuggestion>, EngineError> {
    let mut ranked: Vec<&SequenceRule> = rules
        .iter()
        .filter(|r| {
            r.support() >= config.sequence_min_support_days as usize
                && r.confidence() >= config.sequence_min_confidence
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.confidence()
            .total_cmp(&a.confidence())
            .then(b.support().cmp(&a.support()))
            .then_with(|| (&a.trigger, &a.action).cmp(&(&b.trigger, &b.action)))
    });
    ranked.truncate(config.sequence_limit.max(1));

    ranked
        .into_iter()
        .map(|rule| {
            let (call, manual) = action_call(&rule.action);
            let title = format!(
                "When {}, then {} -> {}",
                rule.trigger,
                rule.action.entity_id(),
                rule.action.value()
            );
            let automation = Automation {
                alias: title.clone(),
                description: manual
                    .then(|| "No direct service for this state; review the action.".to_string()),
                trigger: vec![automation_trigger(&rule.trigger, config.sequence.numeric_bucket_size)],
                condition: Vec::new(),
                action: vec![call.clone()],
                mode: "single".into(),
            };
            Ok(SequenceSuggestion {
                title,
                trigger: rule.trigger.clone(),
                action: rule.action.clone(),
                confidence: rule.confidence(),
                support: rule.support(),
                antecedent_days: rule.antecedent_days.len(),
                window_minutes: mined_window_minutes,
                estimated_service: call.service,
                automation_yaml: automation.to_yaml()?,
            })
        })
        .collect()
}

/// Service call reproducing the action, and whether it needs manual review.
fn action_call(action: &ActionSpec) -> (ServiceCall, bool) {
    match action {
        ActionSpec::SetTemperature { entity_id, target } => {
            let temperature = target
                .parse::<f64>()
                .map(serde_json::Value::from)
                .unwrap_or_else(|_| serde_json::Value::String(target.clone()));
            (
                ServiceCall::new("climate.set_temperature", entity_id)
                    .with_data("temperature", temperature),
                false,
            )
        }
        ActionSpec::State { entity_id, to } => match service_for_state(domain_of(entity_id), to) {
            Some(resolved) => {
                let mut call = ServiceCall::new(&resolved.service, entity_id);
                if let Some((key, value)) = resolved.data {
                    call = call.with_data(key, value);
                }
                (call, false)
            }
            None => (ServiceCall::new("homeassistant.turn_on", entity_id), true),
        },
    }
}

fn automation_trigger(trigger: &TriggerSpec, step: f64) -> Trigger {
    match trigger {
        TriggerSpec::State { entity_id, to } => Trigger::state(entity_id, Some(to)),
        TriggerSpec::NumericTrend {
            entity_id,
            direction,
            bucket,
        } => {
            let edge = bucket.parse::<f64>().ok().map(|b| b - step / 2.0);
            match direction {
                TrendDirection::Up => Trigger::numeric(entity_id, edge, None),
                TrendDirection::Down => {
                    Trigger::numeric(entity_id, None, edge.map(|e| e + step))
                }
            }
        }
        TriggerSpec::NumericState { entity_id, .. } => Trigger::state(entity_id, None),
    }
}

// src/mining/routine.rs — Arrival -> door -> light routine detection

use chrono::{Duration, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::automation::{Automation, Condition, ServiceCall, Trigger};
use super::types::{local_date, Transition};
use crate::infra::config::{MiningConfig, RoutineVocabulary};
use crate::infra::errors::EngineError;

/// Day sets for one observed `(tracker, door, light)` triple.
///
/// Invariant: `matched_days ⊆ arrival_days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineChain {
    pub tracker: String,
    pub door: String,
    pub light: String,
    /// Days the tracker arrived home at all.
    pub arrival_days: BTreeSet<NaiveDate>,
    /// Days an arrival completed the full chain with this door and light.
    pub matched_days: BTreeSet<NaiveDate>,
    /// Local minute-of-day of every completed chain's arrival.
    #[serde(default)]
    pub arrival_minutes: Vec<u32>,
}

impl RoutineChain {
    pub fn support(&self) -> usize {
        self.matched_days.len()
    }

    pub fn confidence(&self) -> f64 {
        if self.arrival_days.is_empty() {
            0.0
        } else {
            self.matched_days.len() as f64 / self.arrival_days.len() as f64
        }
    }

    /// Mean arrival time as `HH:MM`.
    pub fn typical_arrival_time(&self) -> Option<String> {
        if self.arrival_minutes.is_empty() {
            return None;
        }
        let total: u64 = self.arrival_minutes.iter().map(|m| *m as u64).sum();
        let avg = total / self.arrival_minutes.len() as u64;
        Some(format!("{:02}:{:02}", avg / 60, avg % 60))
    }
}

/// A routine that passed the support and confidence thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineSuggestion {
    pub title: String,
    pub tracker: String,
    pub door: String,
    pub light: String,
    pub confidence: f64,
    pub support: usize,
    pub arrival_days: usize,
    pub typical_arrival_time: Option<String>,
    pub automation_yaml: String,
}

/// Predicates for each step of the chain.
struct ChainMatcher<'a> {
    vocab: &'a RoutineVocabulary,
}

impl ChainMatcher<'_> {
    fn is_arrival(&self, t: &Transition) -> bool {
        t.domain() == self.vocab.tracker_domain && self.vocab.home_states.contains(&t.to_state)
    }

    fn is_door_open(&self, t: &Transition) -> bool {
        let domain = t.domain();
        if !self.vocab.door_domains.iter().any(|d| d == domain) {
            return false;
        }
        let object_id = t
            .entity_id
            .split_once('.')
            .map_or(t.entity_id.as_str(), |(_, o)| o)
            .to_lowercase();
        self.vocab
            .door_name_patterns
            .iter()
            .any(|p| object_id.contains(p.as_str()))
            && self.vocab.door_open_states.contains(&t.to_state)
    }

    fn is_light_on(&self, t: &Transition) -> bool {
        t.domain() == self.vocab.light_domain && self.vocab.light_on_states.contains(&t.to_state)
    }
}

/// Index of the first event other than `anchor` in
/// `[anchor time, anchor time + window]` satisfying `pred`.
///
/// Events sharing the anchor's timestamp count whichever side of it they
/// sorted to. `timeline` must be time-ordered.
fn find_first<F>(timeline: &[Transition], anchor: usize, window: Duration, pred: F) -> Option<usize>
where
    F: Fn(&Transition) -> bool,
{
    let start_time = timeline[anchor].timestamp;
    let deadline = start_time + window;
    let from = timeline.partition_point(|t| t.timestamp < start_time);
    timeline
        .iter()
        .enumerate()
        .skip(from)
        .take_while(|(_, t)| t.timestamp <= deadline)
        .find(|&(i, t)| i != anchor && pred(t))
        .map(|(i, _)| i)
}

/// Find every `(tracker, door, light)` triple that completed at least once.
///
/// Every arrival is tried. Each step greedily takes the earliest qualifying
/// event within its window; no combinations are searched.
pub fn detect_routines(timeline: &[Transition], config: &MiningConfig) -> Vec<RoutineChain> {
    let tz = config.time_zone();
    let matcher = ChainMatcher {
        vocab: &config.routine,
    };
    let to_door = Duration::minutes(config.arrival_to_door_minutes as i64);
    let to_light = Duration::minutes(config.door_to_light_minutes as i64);

    let mut arrival_days: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    let mut completed: BTreeMap<(&str, &str, &str), (BTreeSet<NaiveDate>, Vec<u32>)> =
        BTreeMap::new();

    for (i, arrival) in timeline.iter().enumerate() {
        if !matcher.is_arrival(arrival) {
            continue;
        }
        let day = local_date(&arrival.timestamp, &tz);
        arrival_days
            .entry(arrival.entity_id.as_str())
            .or_default()
            .insert(day);

        let Some(door_idx) = find_first(timeline, i, to_door, |t| {
            matcher.is_door_open(t)
        }) else {
            continue;
        };
        let door = &timeline[door_idx];

        let Some(light_idx) = find_first(timeline, door_idx, to_light, |t| {
            matcher.is_light_on(t)
        }) else {
            continue;
        };
        let light = &timeline[light_idx];

        let local = arrival.timestamp.with_timezone(&tz);
        let entry = completed
            .entry((
                arrival.entity_id.as_str(),
                door.entity_id.as_str(),
                light.entity_id.as_str(),
            ))
            .or_default();
        entry.0.insert(day);
        entry.1.push(local.hour() * 60 + local.minute());
    }

    completed
        .into_iter()
        .map(|((tracker, door, light), (matched_days, arrival_minutes))| RoutineChain {
            tracker: tracker.to_string(),
            door: door.to_string(),
            light: light.to_string(),
            arrival_days: arrival_days.get(tracker).cloned().unwrap_or_default(),
            matched_days,
            arrival_minutes,
        })
        .collect()
}

/// Filter chains by the routine thresholds and render their automations.
pub fn suggest_routines(
    chains: &[RoutineChain],
    config: &MiningConfig,
) -> Result<Vec<RoutineSuggestion>, EngineError> {
    let mut out = Vec::new();
    for chain in chains {
        let support = chain.support();
        let confidence = chain.confidence();
        if support < config.routine_min_support_days as usize
            || confidence < config.routine_min_confidence
        {
            continue;
        }

        let title = format!("Auto light when arriving home: {}", chain.light);
        let automation = routine_automation(chain, &title, &config.routine);
        out.push(RoutineSuggestion {
            title,
            tracker: chain.tracker.clone(),
            door: chain.door.clone(),
            light: chain.light.clone(),
            confidence,
            support,
            arrival_days: chain.arrival_days.len(),
            typical_arrival_time: chain.typical_arrival_time(),
            automation_yaml: automation.to_yaml()?,
        });
    }

    out.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.support.cmp(&a.support))
            .then_with(|| (&a.tracker, &a.door, &a.light).cmp(&(&b.tracker, &b.door, &b.light)))
    });
    Ok(out)
}

fn routine_automation(chain: &RoutineChain, title: &str, vocab: &RoutineVocabulary) -> Automation {
    let home = vocab
        .home_states
        .first()
        .map(String::as_str)
        .unwrap_or("home");
    Automation {
        alias: title.to_string(),
        description: Some(format!(
            "Observed on {} of {} arrival days: {} arrives, {} opens, {} turns on.",
            chain.support(),
            chain.arrival_days.len(),
            chain.tracker,
            chain.door,
            chain.light
        )),
        trigger: vec![Trigger::state(&chain.tracker, Some(home))],
        condition: vec![Condition::state(&chain.door, &vocab.door_open_states)],
        action: vec![ServiceCall::new(
            &format!("{}.turn_on", vocab.light_domain),
            &chain.light,
        )],
        mode: "single".into(),
    }
}

// src/mining/stats.rs — Time-slot and global day-set statistics

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{local_date, DayStat, TimeSlotKey, Transition};

/// Two layers of day-based counters: per `(slot, entity)` and per entity.
///
/// Everything is a set insertion, so the result depends only on the set
/// of transitions and never on their order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub slots: BTreeMap<TimeSlotKey, BTreeMap<String, DayStat>>,
    pub global: BTreeMap<String, DayStat>,
}

impl Statistics {
    pub fn from_transitions(transitions: &[Transition], tz: &Tz) -> Self {
        let mut stats = Self::default();
        for t in transitions {
            stats.record(t, tz);
        }
        stats
    }

    pub fn record(&mut self, transition: &Transition, tz: &Tz) {
        let slot = TimeSlotKey::of(&transition.timestamp, tz);
        let day = local_date(&transition.timestamp, tz);

        self.slots
            .entry(slot)
            .or_default()
            .entry(transition.entity_id.clone())
            .or_default()
            .record(&transition.to_state, day);

        self.global
            .entry(transition.entity_id.clone())
            .or_default()
            .record(&transition.to_state, day);
    }

    /// Per-entity stats for one slot.
    pub fn slot(&self, key: &TimeSlotKey) -> Option<&BTreeMap<String, DayStat>> {
        self.slots.get(key)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn entity_count(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }
}

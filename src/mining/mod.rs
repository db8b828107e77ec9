// src/mining/mod.rs — Habit mining: transitions, statistics, routines, sequences

pub mod automation;
pub mod extractor;
pub mod predictor;
pub mod routine;
pub mod sequence;
pub mod stats;
pub mod types;

pub use extractor::{extract, Extraction};
pub use predictor::{predict, Prediction, PredictionSource};
pub use routine::{detect_routines, suggest_routines, RoutineChain, RoutineSuggestion};
pub use sequence::{mine_sequences, suggest_sequences, SequenceRule, SequenceSuggestion};
pub use stats::Statistics;
pub use types::{StateRecord, TimeSlotKey, Transition};

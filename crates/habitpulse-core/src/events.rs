use chrono::NaiveDateTime;
use serde::Serialize;

use crate::habit::HabitKey;
use crate::reminder::{DispatchOutcome, FireDecision};

/// Everything observable a poll pass does produces an Event.
///
/// Timestamps are local wall-clock time, the same clock anchors use.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A boundary was crossed and delivery was attempted.
    HabitFired {
        habit: HabitKey,
        name: String,
        outcome: DispatchOutcome,
        at: NaiveDateTime,
    },
    /// Habit evaluated without firing.
    HabitEvaluated {
        habit: HabitKey,
        decision: FireDecision,
        at: NaiveDateTime,
    },
    /// Habit excluded from this pass because its record is invalid.
    HabitSkipped {
        habit: HabitKey,
        reason: String,
        at: NaiveDateTime,
    },
    /// The habit source could not be read; nothing was evaluated.
    FetchFailed {
        reason: String,
        at: NaiveDateTime,
    },
    /// Progress entries dropped for habits that disappeared.
    EntriesEvicted {
        habits: Vec<HabitKey>,
        at: NaiveDateTime,
    },
    /// A tick arrived while another pass held the store and was dropped.
    PassSkipped {
        at: NaiveDateTime,
    },
}

impl Event {
    pub fn at(&self) -> NaiveDateTime {
        match self {
            Event::HabitFired { at, .. }
            | Event::HabitEvaluated { at, .. }
            | Event::HabitSkipped { at, .. }
            | Event::FetchFailed { at, .. }
            | Event::EntriesEvicted { at, .. }
            | Event::PassSkipped { at } => *at,
        }
    }
}

//! Fire decisions.
//!
//! Two cadences are supported:
//!
//! - [`Cadence::WallClock`] derives active minutes from the timestamp, so a
//!   late or skipped tick cannot drift the schedule. Boundaries sit at
//!   `anchor, anchor + k, anchor + 2k, ...` local time.
//! - [`Cadence::TickCount`] counts one minute of progress per tick. It is
//!   only correct when the driver ticks exactly once a minute, which config
//!   validation enforces.
//!
//! Both take the interval as `NonZeroU32`, so the modulo can never see zero.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

use super::clock;
use super::progress::ProgressEntry;
use crate::habit::HabitSchedule;

/// Outcome of evaluating one habit for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "elapsed", rename_all = "snake_case")]
pub enum FireDecision {
    /// Current time is before the anchor; nothing accumulates.
    NotYetActive,
    /// Past the anchor, boundary not reached. Carries the new count.
    Progressing(u32),
    /// Boundary crossed. The count is reset to 0.
    Fire,
}

impl FireDecision {
    /// Count the entry holds after this decision.
    pub fn elapsed(self) -> u32 {
        match self {
            FireDecision::Progressing(n) => n,
            FireDecision::NotYetActive | FireDecision::Fire => 0,
        }
    }

    pub fn is_fire(self) -> bool {
        matches!(self, FireDecision::Fire)
    }
}

/// How elapsed active time is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    WallClock,
    /// One tick is one minute.
    TickCount,
}

impl Cadence {
    /// Evaluate `schedule` at `now`, updating `entry` in place.
    pub fn advance(
        self,
        entry: &mut ProgressEntry,
        schedule: &HabitSchedule,
        now: NaiveDateTime,
    ) -> FireDecision {
        let (current, anchor) = clock::normalize(now, schedule.anchor);
        let today = now.date();
        if entry.cycle_date != Some(today) {
            entry.rearm();
            entry.cycle_date = Some(today);
        }

        let decision = match self {
            Cadence::TickCount => {
                tick_step(current, anchor, schedule.interval_minutes, entry.elapsed_count)
            }
            Cadence::WallClock => {
                let (decision, fired_at) = wall_clock_step(
                    current,
                    anchor,
                    schedule.interval_minutes,
                    entry.last_fire_minute,
                );
                entry.last_fire_minute = fired_at;
                decision
            }
        };

        if decision == FireDecision::NotYetActive {
            entry.rearm();
        } else {
            entry.elapsed_count = decision.elapsed();
        }
        decision
    }
}

/// One-tick-equals-one-minute step.
///
/// Before the anchor nothing is counted. Otherwise the count advances by one
/// and fires when it reaches a multiple of the interval.
pub fn tick_step(current: u32, anchor: u32, interval: NonZeroU32, elapsed: u32) -> FireDecision {
    if current < anchor {
        return FireDecision::NotYetActive;
    }
    let k = interval.get();
    let next = elapsed.saturating_add(1);
    // A count carried over from a larger interval has already crossed.
    if next % k == 0 || next > k {
        FireDecision::Fire
    } else {
        FireDecision::Progressing(next)
    }
}

/// Timestamp-derived step.
///
/// Returns the decision and the minute of the last fired boundary after it.
/// Only the most recent crossed boundary can fire; earlier ones missed by
/// skipped ticks are not replayed.
pub fn wall_clock_step(
    current: u32,
    anchor: u32,
    interval: NonZeroU32,
    last_fire_minute: Option<u32>,
) -> (FireDecision, Option<u32>) {
    if current < anchor {
        return (FireDecision::NotYetActive, None);
    }
    let k = interval.get();
    let active = current - anchor;
    let boundary = anchor + (active / k) * k;

    match last_fire_minute {
        Some(last) if boundary <= last => {
            // Anchor or interval edits can put `last` ahead of `current`.
            let since = current.saturating_sub(last);
            let elapsed = if since < k { since } else { active % k };
            (FireDecision::Progressing(elapsed), Some(last))
        }
        _ => (FireDecision::Fire, Some(boundary)),
    }
}

//! Per-habit progress between fires.
//!
//! Volatile by design: the store lives as long as its coordinator and is
//! never written to disk.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::habit::HabitKey;

/// Progress for one habit identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEntry {
    /// Active minutes since the last fire, always below the interval
    /// outside the instant of a fire.
    pub elapsed_count: u32,
    /// Local date the current cycle belongs to.
    pub cycle_date: Option<NaiveDate>,
    /// Minute of day of the boundary that last fired in this cycle.
    pub last_fire_minute: Option<u32>,
    /// Interval as of the last pass that saw the habit.
    pub interval_minutes: u32,
    /// Timestamp of the last successful fetch that listed the habit.
    pub last_seen: NaiveDateTime,
}

impl ProgressEntry {
    fn new(now: NaiveDateTime, interval_minutes: u32) -> Self {
        Self {
            elapsed_count: 0,
            cycle_date: None,
            last_fire_minute: None,
            interval_minutes,
            last_seen: now,
        }
    }

    /// Drop all cycle state, e.g. before the anchor or on a new day.
    pub fn rearm(&mut self) {
        self.elapsed_count = 0;
        self.last_fire_minute = None;
    }
}

/// Map from habit identity to its progress entry.
#[derive(Debug, Default)]
pub struct ProgressStore {
    entries: HashMap<HabitKey, ProgressEntry>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `key`, created with a zero count on first use.
    ///
    /// Also records that the habit was seen at `now` with `interval_minutes`.
    pub fn touch(
        &mut self,
        key: &HabitKey,
        now: NaiveDateTime,
        interval_minutes: u32,
    ) -> &mut ProgressEntry {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| ProgressEntry::new(now, interval_minutes));
        entry.last_seen = now;
        entry.interval_minutes = interval_minutes;
        entry
    }

    pub fn get(&self, key: &HabitKey) -> Option<&ProgressEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HabitKey, &ProgressEntry)> {
        self.entries.iter()
    }

    /// Remove entries whose habit was absent from the latest fetch for more
    /// than one full cycle of its interval. Returns the evicted keys, sorted.
    ///
    /// Only call this after a successful fetch; `present` must hold every
    /// identity that fetch returned, valid or not.
    pub fn evict_stale(&mut self, present: &HashSet<HabitKey>, now: NaiveDateTime) -> Vec<HabitKey> {
        let mut evicted = Vec::new();
        self.entries.retain(|key, entry| {
            if present.contains(key) {
                return true;
            }
            let cycle = Duration::minutes(i64::from(entry.interval_minutes.max(1)));
            let keep = now.signed_duration_since(entry.last_seen) <= cycle;
            if !keep {
                evicted.push(key.clone());
            }
            keep
        });
        evicted.sort();
        evicted
    }
}

//! Habit records as supplied by a habit source.
//!
//! The reminder engine only reads these. Validation is deliberately lenient
//! at the type level (`start_time` is an optional string, `duration` is
//! signed) so that malformed rows coming out of storage can be represented
//! and excluded per pass instead of failing the whole fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use crate::error::ValidationError;
use crate::reminder::clock::AnchorTime;

/// A user-defined recurring habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitRecord {
    /// Durable identifier, absent for records that predate ids.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name, also used in the alert body.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Anchor time of day as `HH:MM`.
    #[serde(default)]
    pub start_time: Option<String>,
    /// Repeat interval in minutes.
    pub duration: i64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl HabitRecord {
    pub fn new(name: impl Into<String>, start_time: &str, duration: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            category: None,
            start_time: Some(start_time.to_string()),
            duration,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Resolve the key this habit's progress is stored under.
    pub fn key(&self, mode: IdentityMode) -> HabitKey {
        match (mode, self.id.as_deref()) {
            (IdentityMode::Id, Some(id)) if !id.trim().is_empty() => HabitKey(format!("id:{id}")),
            _ => HabitKey(format!("name:{}", self.name)),
        }
    }

    /// Check the record is evaluable and return its parsed schedule.
    ///
    /// # Errors
    /// Returns an error if the anchor is missing or malformed, or if the
    /// interval is not strictly positive.
    pub fn schedule(&self) -> Result<HabitSchedule, ValidationError> {
        let raw = self
            .start_time
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ValidationError::MissingAnchor {
                habit: self.name.clone(),
            })?;
        let anchor: AnchorTime = raw.parse()?;

        if self.duration <= 0 {
            return Err(ValidationError::NonPositiveInterval {
                habit: self.name.clone(),
                interval: self.duration,
            });
        }
        let interval_minutes = u32::try_from(self.duration)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "duration".into(),
                message: format!("{} minutes is out of range", self.duration),
            })?;

        Ok(HabitSchedule {
            anchor,
            interval_minutes,
        })
    }
}

/// The validated timing part of a habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HabitSchedule {
    pub anchor: AnchorTime,
    pub interval_minutes: NonZeroU32,
}

/// How habit identity is derived for the progress store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// Durable id, falling back to the display name when a record has none.
    #[default]
    Id,
    /// Display name only. Renaming a habit restarts its progress and
    /// same-named habits share one entry.
    Name,
}

/// Key into the progress store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HabitKey(pub String);

impl fmt::Display for HabitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Minute-of-day normalization.
//!
//! Everything here is local wall-clock time. Dates, offsets and DST are
//! ignored: 09:00 means "when the local clock reads 09:00".

use chrono::{NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A habit's time-of-day anchor, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnchorTime {
    hour: u8,
    minute: u8,
}

impl AnchorTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour >= 24 || minute >= 60 {
            return Err(ValidationError::InvalidAnchor {
                value: format!("{hour}:{minute:02}"),
                message: "hour must be < 24 and minute < 60".into(),
            });
        }
        Ok(Self { hour, minute })
    }

    /// Minutes since local midnight, in `[0, 1440)`.
    pub fn minute_of_day(self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}

impl FromStr for AnchorTime {
    type Err = ValidationError;

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS`; seconds are dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ValidationError::InvalidAnchor {
            value: s.to_string(),
            message: message.to_string(),
        };

        let mut parts = s.trim().split(':');
        let hour = parts.next().ok_or_else(|| invalid("empty"))?;
        let minute = parts.next().ok_or_else(|| invalid("expected HH:MM"))?;
        if let Some(second) = parts.next() {
            second
                .parse::<u8>()
                .ok()
                .filter(|sec| *sec < 60)
                .ok_or_else(|| invalid("bad seconds"))?;
        }
        if parts.next().is_some() || minute.len() != 2 || hour.is_empty() || hour.len() > 2 {
            return Err(invalid("expected HH:MM"));
        }

        let hour = hour.parse::<u8>().map_err(|_| invalid("bad hour"))?;
        let minute = minute.parse::<u8>().map_err(|_| invalid("bad minute"))?;
        Self::new(hour, minute).map_err(|_| invalid("hour must be < 24 and minute < 60"))
    }
}

impl fmt::Display for AnchorTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Minutes since local midnight for a wall-clock timestamp.
pub fn minute_of_day(now: NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

/// Returns `(current_minutes, anchor_minutes)`, both in `[0, 1440)`.
pub fn normalize(now: NaiveDateTime, anchor: AnchorTime) -> (u32, u32) {
    (minute_of_day(now), anchor.minute_of_day())
}

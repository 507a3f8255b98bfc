//! Habit sources.

use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::error::SourceError;
use crate::habit::HabitRecord;

/// Supplies the current habit list on demand.
///
/// Called once per pass with no caching in between, so edits show up on
/// the next tick.
pub trait HabitSource: Send + Sync {
    fn list_habits(&self) -> impl Future<Output = Result<Vec<HabitRecord>, SourceError>> + Send;
}

impl<T: HabitSource> HabitSource for Arc<T> {
    fn list_habits(&self) -> impl Future<Output = Result<Vec<HabitRecord>, SourceError>> + Send {
        (**self).list_habits()
    }
}

/// A `Vec`-backed habit source.
#[derive(Debug, Default)]
pub struct InMemorySource {
    habits: RwLock<Vec<HabitRecord>>,
}

impl InMemorySource {
    pub fn new(habits: Vec<HabitRecord>) -> Self {
        Self {
            habits: RwLock::new(habits),
        }
    }

    /// Replace the whole list.
    pub fn set(&self, habits: Vec<HabitRecord>) {
        if let Ok(mut guard) = self.habits.write() {
            *guard = habits;
        }
    }

    pub fn push(&self, habit: HabitRecord) {
        if let Ok(mut guard) = self.habits.write() {
            guard.push(habit);
        }
    }
}

impl HabitSource for InMemorySource {
    async fn list_habits(&self) -> Result<Vec<HabitRecord>, SourceError> {
        self.habits
            .read()
            .map(|h| h.clone())
            .map_err(|_| SourceError::Unavailable("habit list lock poisoned".into()))
    }
}

//! SQLite-backed habit storage.
//!
//! Also the default [`HabitSource`] for the reminder engine: every pass
//! re-reads the table, so CLI edits are picked up on the next tick. The
//! engine's read runs on the blocking pool so a busy database cannot stall
//! the runtime past the fetch timeout.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::error::{ConfigError, CoreError, DatabaseError, SourceError};
use crate::habit::HabitRecord;
use crate::reminder::HabitSource;

const SELECT_HABITS: &str =
    "SELECT id, name, description, category, start_time, duration, created_at FROM habits";

/// SQLite database holding habit records.
pub struct HabitDb {
    conn: Arc<Mutex<Connection>>,
}

impl HabitDb {
    /// Open the database at `~/.config/habitpulse/habitpulse.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let dir = data_dir().map_err(|e| ConfigError::DirUnavailable(e.to_string()))?;
        Self::open_at(&dir.join("habitpulse.db"))
    }

    /// Open (or create) a database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, CoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        migrations::migrate(&conn).map_err(DatabaseError::from)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        lock(&self.conn)
    }

    /// Insert a habit, assigning a fresh id when it has none. Returns the id.
    ///
    /// # Errors
    /// Returns an error if the insert fails (e.g. duplicate id).
    pub fn add_habit(&self, habit: &HabitRecord) -> Result<String, DatabaseError> {
        let id = habit
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.conn()?.execute(
            "INSERT INTO habits (id, name, description, category, start_time, duration, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                habit.name,
                habit.description,
                habit.category,
                habit.start_time,
                habit.duration,
                habit.created_at.to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// All habits, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list(&self) -> Result<Vec<HabitRecord>, DatabaseError> {
        list_habits(&*self.conn()?)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<HabitRecord>, DatabaseError> {
        let conn = self.conn()?;
        let habit = conn
            .query_row(&format!("{SELECT_HABITS} WHERE id = ?1"), params![id], row_to_habit)
            .optional()?;
        Ok(habit)
    }

    /// Change a habit's display name. Progress follows the id unless the
    /// engine keys by name.
    ///
    /// # Errors
    /// Returns `NotFound` if no habit has this id.
    pub fn rename(&self, id: &str, name: &str) -> Result<(), DatabaseError> {
        let changed = self
            .conn()?
            .execute("UPDATE habits SET name = ?1 WHERE id = ?2", params![name, id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// # Errors
    /// Returns `NotFound` if no habit has this id.
    pub fn remove(&self, id: &str) -> Result<(), DatabaseError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM habits WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete every habit. Returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn purge(&self) -> Result<usize, DatabaseError> {
        Ok(self.conn()?.execute("DELETE FROM habits", [])?)
    }
}

impl HabitSource for HabitDb {
    async fn list_habits(&self) -> Result<Vec<HabitRecord>, SourceError> {
        let conn = Arc::clone(&self.conn);
        let habits = tokio::task::spawn_blocking(move || list_habits(&*lock(&conn)?))
            .await
            .map_err(|e| SourceError::Unavailable(format!("habit query task failed: {e}")))??;
        Ok(habits)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
    conn.lock()
        .map_err(|_| DatabaseError::QueryFailed("connection mutex poisoned".into()))
}

fn list_habits(conn: &Connection) -> Result<Vec<HabitRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("{SELECT_HABITS} ORDER BY created_at, id"))?;
    let habits = stmt
        .query_map([], row_to_habit)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(habits)
}

fn row_to_habit(row: &Row<'_>) -> rusqlite::Result<HabitRecord> {
    let created_at: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(HabitRecord {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        start_time: row.get(4)?,
        duration: row.get(5)?,
        created_at,
    })
}

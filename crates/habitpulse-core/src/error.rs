//! Core error types for habitpulse-core.
//!
//! Errors are grouped by the layer that raises them. None of them is fatal to
//! a poll pass: the coordinator logs and carries on, but storage and config
//! callers get a typed error to report.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for habitpulse-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Habit source errors
    #[error("Habit source error: {0}")]
    Source(#[from] SourceError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// No habit with the given id
    #[error("Habit not found: {0}")]
    NotFound(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home/config directory could not be prepared
    #[error("Config directory unavailable: {0}")]
    DirUnavailable(String),
}

/// Validation errors for habit records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Habit has no anchor time
    #[error("Habit '{habit}' has no start time")]
    MissingAnchor { habit: String },

    /// Anchor time could not be parsed as HH:MM
    #[error("Invalid start time '{value}': {message}")]
    InvalidAnchor { value: String, message: String },

    /// Interval is zero or negative
    #[error("Habit '{habit}' has non-positive interval {interval}")]
    NonPositiveInterval { habit: String, interval: i64 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Failures reported by a habit source.
///
/// The coordinator treats every variant as "no habits this tick".
#[derive(Error, Debug)]
pub enum SourceError {
    /// Backing store could not be read
    #[error("habit source unavailable: {0}")]
    Unavailable(String),

    /// Fetch exceeded the coordinator's guard
    #[error("habit fetch timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Storage layer error while listing habits
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// A notification channel failed to show an alert.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("alert delivery failed: {0}")]
pub struct DeliveryError(pub String);

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                match inner.code {
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                        DatabaseError::Locked
                    }
                    _ => DatabaseError::QueryFailed(err.to_string()),
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

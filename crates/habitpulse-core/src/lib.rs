//! # habitpulse Core Library
//!
//! This library provides the core logic for habitpulse, a habit reminder
//! tool. It follows a CLI-first philosophy: every operation is available
//! through the standalone CLI binary over this same library.
//!
//! ## Architecture
//!
//! - **Reminder Engine**: a wall-clock-based dispatch engine that requires the
//!   caller to periodically invoke a poll pass. Each pass re-reads the habit
//!   list, decides per habit whether an interval boundary was crossed, and
//!   gates alerts on notification permission.
//! - **Storage**: SQLite-based habit storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`PollCoordinator`]: one evaluation pass per tick
//! - [`PollDriver`]: interval loop that spawns passes
//! - [`HabitDb`]: habit persistence, also the default [`HabitSource`]
//! - [`Config`]: application configuration management
//! - [`NotificationChannel`]: trait for alert delivery backends

pub mod error;
pub mod events;
pub mod habit;
pub mod reminder;
pub mod storage;

pub use error::{ConfigError, CoreError, DatabaseError, DeliveryError, SourceError, ValidationError};
pub use events::Event;
pub use habit::{HabitKey, HabitRecord, HabitSchedule, IdentityMode};
pub use reminder::{
    AnchorTime, Cadence, CoordinatorOptions, DispatchGate, DispatchOutcome, DriverOptions,
    DriverSummary, FireDecision, HabitSource, InMemorySource, NotificationChannel, OverlapPolicy,
    PassReport, Permission, PollCoordinator, PollDriver, ProgressEntry, ProgressStore,
    RecordingChannel,
};
pub use storage::{Config, HabitDb};

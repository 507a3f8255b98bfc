//! Periodic reminder dispatch engine.
//!
//! Leaves first: [`clock`] normalizes times to minute-of-day, [`progress`]
//! holds per-habit counters, [`decision`] decides fires, [`dispatch`] gates
//! delivery on permission, and [`coordinator`] runs one pass per tick.
//! [`driver`] is a ready-made tick loop for hosts that do not bring their own.

pub mod clock;
pub mod coordinator;
pub mod decision;
pub mod dispatch;
pub mod driver;
pub mod progress;
pub mod source;

pub use clock::AnchorTime;
pub use coordinator::{CoordinatorOptions, OverlapPolicy, PassReport, PollCoordinator};
pub use decision::{Cadence, FireDecision};
pub use dispatch::{
    DispatchGate, DispatchOutcome, NotificationChannel, Permission, RecordingChannel,
};
pub use driver::{DriverOptions, DriverSummary, PollDriver};
pub use progress::{ProgressEntry, ProgressStore};
pub use source::{HabitSource, InMemorySource};

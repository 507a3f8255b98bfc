mod config;
pub mod habit_db;
pub mod migrations;

pub use config::{Config, NotificationsConfig, PollConfig, ProgressConfig};
pub use habit_db::HabitDb;

use std::path::PathBuf;

/// Returns `~/.config/habitpulse[-dev]/` based on HABITPULSE_ENV.
///
/// Set HABITPULSE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HABITPULSE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("habitpulse-dev")
    } else {
        base_dir.join("habitpulse")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

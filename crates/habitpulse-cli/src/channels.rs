//! Notification channels available from the command line.

use habitpulse_core::storage::NotificationsConfig;
use habitpulse_core::{DeliveryError, NotificationChannel, Permission};
use std::process::Command;

/// Prints alerts to stdout.
pub struct ConsoleChannel {
    permission: Permission,
}

impl ConsoleChannel {
    pub fn new(permission: Permission) -> Self {
        Self { permission }
    }
}

impl NotificationChannel for ConsoleChannel {
    fn request_permission(&self) -> Permission {
        self.permission
    }

    fn show_alert(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        println!("🔔 {title}: {body}");
        Ok(())
    }
}

/// Runs an external program with the title and body appended as arguments,
/// e.g. `notify-send`.
pub struct CommandChannel {
    argv: Vec<String>,
    permission: Permission,
}

impl CommandChannel {
    pub fn new(argv: Vec<String>, permission: Permission) -> Self {
        Self { argv, permission }
    }
}

impl NotificationChannel for CommandChannel {
    fn request_permission(&self) -> Permission {
        self.permission
    }

    fn show_alert(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| DeliveryError("no notification command configured".into()))?;
        let mut child = Command::new(program)
            .args(args)
            .arg(title)
            .arg(body)
            .spawn()
            .map_err(|e| DeliveryError(format!("{program}: {e}")))?;

        // Reap in the background; the pass does not wait on the notifier.
        std::thread::spawn(move || {
            if let Err(e) = child.wait() {
                tracing::warn!(error = %e, "notification command did not exit cleanly");
            }
        });
        Ok(())
    }
}

/// Build the channel selected by the notifications config.
pub fn from_config(config: &NotificationsConfig) -> Box<dyn NotificationChannel> {
    match &config.command {
        Some(argv) => Box::new(CommandChannel::new(argv.clone(), config.permission)),
        None => Box::new(ConsoleChannel::new(config.permission)),
    }
}

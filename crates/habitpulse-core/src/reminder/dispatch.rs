//! Permission-gated alert delivery.
//!
//! A fire is attempted once. Denied or undecided permission drops it, and a
//! failed delivery is logged and forgotten. Progress has already been reset
//! by the time the gate runs, so nothing here can re-arm a habit early.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::DeliveryError;

pub const DEFAULT_ALERT_TITLE: &str = "Habit Reminder";

/// Permission state of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// The user has not decided yet.
    #[default]
    Prompt,
}

/// A permission-gated way of showing one-shot alerts.
///
/// Permission is asked for on every fire, never cached, since the user can
/// change it outside the process at any time.
pub trait NotificationChannel: Send + Sync {
    fn request_permission(&self) -> Permission;

    /// Show an alert. Callers do not retry on error.
    fn show_alert(&self, title: &str, body: &str) -> Result<(), DeliveryError>;
}

impl<T: NotificationChannel + ?Sized> NotificationChannel for Arc<T> {
    fn request_permission(&self) -> Permission {
        (**self).request_permission()
    }

    fn show_alert(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        (**self).show_alert(title, body)
    }
}

impl<T: NotificationChannel + ?Sized> NotificationChannel for Box<T> {
    fn request_permission(&self) -> Permission {
        (**self).request_permission()
    }

    fn show_alert(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        (**self).show_alert(title, body)
    }
}

/// What happened to one fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered,
    Dropped { permission: Permission },
    Failed { reason: String },
    /// Notifications are switched off in config.
    Suppressed,
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

pub fn alert_body(habit_name: &str) -> String {
    format!("Time for: {habit_name} 🚀")
}

/// Gate between fire decisions and a notification channel.
#[derive(Debug)]
pub struct DispatchGate<N> {
    channel: N,
    title: String,
    enabled: bool,
}

impl<N: NotificationChannel> DispatchGate<N> {
    pub fn new(channel: N) -> Self {
        Self {
            channel,
            title: DEFAULT_ALERT_TITLE.to_string(),
            enabled: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn channel(&self) -> &N {
        &self.channel
    }

    /// Attempt delivery of one fire for `habit_name`.
    pub fn dispatch(&self, habit_name: &str) -> DispatchOutcome {
        if !self.enabled {
            tracing::debug!(habit = habit_name, "notifications disabled, fire suppressed");
            return DispatchOutcome::Suppressed;
        }

        match self.channel.request_permission() {
            Permission::Granted => {}
            permission => {
                tracing::warn!(habit = habit_name, ?permission, "notification permission not granted, fire dropped");
                return DispatchOutcome::Dropped { permission };
            }
        }

        match self.channel.show_alert(&self.title, &alert_body(habit_name)) {
            Ok(()) => {
                tracing::info!(habit = habit_name, "reminder delivered");
                DispatchOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(habit = habit_name, error = %e, "reminder delivery failed");
                DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// In-memory channel that records alerts. Handy for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    permission: std::sync::Mutex<Permission>,
    fail: std::sync::atomic::AtomicBool,
    alerts: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission: std::sync::Mutex::new(permission),
            ..Self::default()
        }
    }

    pub fn set_permission(&self, permission: Permission) {
        if let Ok(mut p) = self.permission.lock() {
            *p = permission;
        }
    }

    /// Make subsequent `show_alert` calls fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// `(title, body)` of every alert shown so far.
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl NotificationChannel for RecordingChannel {
    fn request_permission(&self) -> Permission {
        self.permission.lock().map(|p| *p).unwrap_or(Permission::Denied)
    }

    fn show_alert(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DeliveryError("channel unavailable".into()));
        }
        self.alerts
            .lock()
            .map_err(|_| DeliveryError("alert log poisoned".into()))?
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

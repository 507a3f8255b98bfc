//! Interval-based poll driver.
//!
//! Each tick spawns its pass as a task, so a slow habit source can overlap
//! the next tick. The coordinator, not the driver, decides whether an
//! overlapping pass is dropped or queued.

use chrono::Local;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

use super::coordinator::{PassReport, PollCoordinator};
use super::dispatch::NotificationChannel;
use super::source::HabitSource;

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Time between ticks.
    pub interval: Duration,
    /// Stop after this many ticks. `None` runs until shutdown.
    pub max_ticks: Option<u64>,
    /// Align progress with the clock before the first tick so boundaries
    /// crossed before startup are not alerted.
    pub prime_on_start: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_ticks: None,
            prime_on_start: true,
        }
    }
}

/// Totals over a driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverSummary {
    pub ticks: u64,
    pub passes: u64,
    pub skipped: u64,
    pub fetch_failures: u64,
    pub fired: u64,
    pub delivered: u64,
    /// Passes that panicked.
    pub aborted: u64,
}

impl DriverSummary {
    fn absorb(&mut self, joined: Result<PassReport, JoinError>) -> Option<PassReport> {
        match joined {
            Ok(report) => {
                if report.skipped {
                    self.skipped += 1;
                } else {
                    self.passes += 1;
                }
                if report.fetch_error.is_some() {
                    self.fetch_failures += 1;
                }
                self.fired += report.fired as u64;
                self.delivered += report.delivered as u64;
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "poll pass aborted");
                self.aborted += 1;
                None
            }
        }
    }
}

pub struct PollDriver<S, N> {
    coordinator: Arc<PollCoordinator<S, N>>,
    options: DriverOptions,
}

impl<S, N> PollDriver<S, N>
where
    S: HabitSource + 'static,
    N: NotificationChannel + 'static,
{
    pub fn new(coordinator: Arc<PollCoordinator<S, N>>, options: DriverOptions) -> Self {
        Self {
            coordinator,
            options,
        }
    }

    pub fn coordinator(&self) -> &Arc<PollCoordinator<S, N>> {
        &self.coordinator
    }

    /// Tick until `shutdown` resolves or `max_ticks` is reached, then wait
    /// for in-flight passes. `on_report` sees every finished pass.
    pub async fn run<F, R>(&self, shutdown: F, mut on_report: R) -> DriverSummary
    where
        F: Future<Output = ()>,
        R: FnMut(&PassReport),
    {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut passes = JoinSet::new();
        let mut summary = DriverSummary::default();
        tokio::pin!(shutdown);

        if self.options.prime_on_start {
            let primed = self.coordinator.prime_at(Local::now().naive_local()).await;
            tracing::debug!(habits = primed.evaluated, "progress primed");
        }

        tracing::info!(interval = ?self.options.interval, "poll driver started");
        loop {
            if self.options.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping poll driver");
                    break;
                }
                _ = ticker.tick() => {
                    summary.ticks += 1;
                    let coordinator = Arc::clone(&self.coordinator);
                    passes.spawn(async move { coordinator.poll().await });
                }
                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    if let Some(report) = summary.absorb(joined) {
                        on_report(&report);
                    }
                }
            }
        }

        while let Some(joined) = passes.join_next().await {
            if let Some(report) = summary.absorb(joined) {
                on_report(&report);
            }
        }
        tracing::info!(ticks = summary.ticks, fired = summary.fired, "poll driver stopped");
        summary
    }
}

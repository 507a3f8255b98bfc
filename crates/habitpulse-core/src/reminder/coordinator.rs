//! One evaluation pass per tick.
//!
//! The coordinator owns the progress store behind an async mutex that is
//! held for the whole pass, fetch included. Two passes therefore never
//! interleave on the store; an overlapping tick is either dropped or queued
//! according to [`OverlapPolicy`].

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;

use super::decision::{Cadence, FireDecision};
use super::dispatch::{DispatchGate, DispatchOutcome, NotificationChannel};
use super::progress::{ProgressEntry, ProgressStore};
use super::source::HabitSource;
use crate::error::SourceError;
use crate::events::Event;
use crate::habit::{HabitKey, HabitRecord, IdentityMode};

/// What to do with a tick that arrives while a pass is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the new tick.
    #[default]
    Skip,
    /// Wait for the running pass, then run.
    Queue,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub cadence: Cadence,
    pub overlap: OverlapPolicy,
    pub identity: IdentityMode,
    /// Upper bound on a single habit source fetch.
    pub fetch_timeout: Duration,
    /// Drop progress for habits gone for more than one interval.
    pub evict_stale: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            cadence: Cadence::default(),
            overlap: OverlapPolicy::default(),
            identity: IdentityMode::default(),
            fetch_timeout: Duration::from_secs(10),
            evict_stale: true,
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub at: Option<NaiveDateTime>,
    /// The tick was dropped because another pass was running.
    pub skipped: bool,
    /// Set when the habit source failed; nothing was evaluated.
    pub fetch_error: Option<String>,
    pub fetched: usize,
    pub evaluated: usize,
    pub invalid: usize,
    pub fired: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub failed: usize,
    pub evicted: usize,
    pub events: Vec<Event>,
}

impl PassReport {
    fn started(at: NaiveDateTime) -> Self {
        Self {
            at: Some(at),
            ..Self::default()
        }
    }

    fn record_dispatch(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Dropped { .. } | DispatchOutcome::Suppressed => self.dropped += 1,
            DispatchOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Names of habits that fired in this pass, in evaluation order.
    pub fn fired_names(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::HabitFired { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Runs evaluation passes over a habit source.
pub struct PollCoordinator<S, N> {
    source: S,
    gate: DispatchGate<N>,
    store: Mutex<ProgressStore>,
    options: CoordinatorOptions,
}

impl<S: HabitSource, N: NotificationChannel> PollCoordinator<S, N> {
    pub fn new(source: S, gate: DispatchGate<N>, options: CoordinatorOptions) -> Self {
        Self {
            source,
            gate,
            store: Mutex::new(ProgressStore::new()),
            options,
        }
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    pub fn gate(&self) -> &DispatchGate<N> {
        &self.gate
    }

    /// Run one pass at the current local time.
    pub async fn poll(&self) -> PassReport {
        self.poll_at(Local::now().naive_local()).await
    }

    /// Run one pass as if the local clock read `now`.
    pub async fn poll_at(&self, now: NaiveDateTime) -> PassReport {
        self.pass(now, true).await
    }

    /// Align progress with `now` without alerting.
    ///
    /// Boundaries already crossed are marked fired, so a freshly started
    /// engine only alerts on boundaries it actually sees go by. A no-op for
    /// tick counting, where there is nothing to align.
    pub async fn prime_at(&self, now: NaiveDateTime) -> PassReport {
        if self.options.cadence == Cadence::TickCount {
            return PassReport::started(now);
        }
        self.pass(now, false).await
    }

    async fn pass(&self, now: NaiveDateTime, deliver: bool) -> PassReport {
        let mut store = match self.options.overlap {
            OverlapPolicy::Skip => match self.store.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!(%now, "previous pass still running, tick dropped");
                    let mut report = PassReport::started(now);
                    report.skipped = true;
                    report.events.push(Event::PassSkipped { at: now });
                    return report;
                }
            },
            OverlapPolicy::Queue => self.store.lock().await,
        };
        self.run_pass(&mut store, now, deliver).await
    }

    /// Copy of the current progress entries, sorted by key.
    pub async fn progress(&self) -> Vec<(HabitKey, ProgressEntry)> {
        let store = self.store.lock().await;
        let mut entries: Vec<_> = store
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    async fn fetch(&self) -> Result<Vec<HabitRecord>, SourceError> {
        let timeout = self.options.fetch_timeout;
        match tokio::time::timeout(timeout, self.source.list_habits()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn run_pass(
        &self,
        store: &mut ProgressStore,
        now: NaiveDateTime,
        deliver: bool,
    ) -> PassReport {
        let mut report = PassReport::started(now);

        let habits = match self.fetch().await {
            Ok(habits) => habits,
            Err(e) => {
                tracing::warn!(error = %e, "habit fetch failed, skipping this tick");
                report.fetch_error = Some(e.to_string());
                report.events.push(Event::FetchFailed {
                    reason: e.to_string(),
                    at: now,
                });
                return report;
            }
        };
        report.fetched = habits.len();

        let mut present = HashSet::with_capacity(habits.len());
        for habit in &habits {
            let key = habit.key(self.options.identity);
            present.insert(key.clone());

            let schedule = match habit.schedule() {
                Ok(schedule) => schedule,
                Err(e) => {
                    tracing::warn!(habit = %key, error = %e, "invalid habit excluded from pass");
                    report.invalid += 1;
                    report.events.push(Event::HabitSkipped {
                        habit: key,
                        reason: e.to_string(),
                        at: now,
                    });
                    continue;
                }
            };

            let entry = store.touch(&key, now, schedule.interval_minutes.get());
            let decision = self.options.cadence.advance(entry, &schedule, now);
            report.evaluated += 1;
            tracing::debug!(habit = %key, ?decision, elapsed = entry.elapsed_count, "habit evaluated");

            match decision {
                FireDecision::Fire => {
                    report.fired += 1;
                    let outcome = if deliver {
                        self.gate.dispatch(&habit.name)
                    } else {
                        DispatchOutcome::Suppressed
                    };
                    report.record_dispatch(&outcome);
                    report.events.push(Event::HabitFired {
                        habit: key,
                        name: habit.name.clone(),
                        outcome,
                        at: now,
                    });
                }
                decision => report.events.push(Event::HabitEvaluated {
                    habit: key,
                    decision,
                    at: now,
                }),
            }
        }

        if self.options.evict_stale {
            let evicted = store.evict_stale(&present, now);
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "evicted progress for removed habits");
                report.evicted = evicted.len();
                report.events.push(Event::EntriesEvicted {
                    habits: evicted,
                    at: now,
                });
            }
        }

        if report.fired > 0 {
            tracing::info!(
                fired = report.fired,
                delivered = report.delivered,
                evaluated = report.evaluated,
                "poll pass complete"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::HabitRecord;
    use crate::reminder::dispatch::{Permission, RecordingChannel};
    use crate::reminder::source::InMemorySource;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn coordinator(
        habits: Vec<HabitRecord>,
        permission: Permission,
        options: CoordinatorOptions,
    ) -> PollCoordinator<InMemorySource, Arc<RecordingChannel>> {
        let channel = Arc::new(RecordingChannel::new(permission));
        PollCoordinator::new(InMemorySource::new(habits), DispatchGate::new(channel), options)
    }

    #[tokio::test]
    async fn fires_at_anchor_and_every_interval() {
        let coord = coordinator(
            vec![HabitRecord::new("Stretch", "09:00", 5).with_id("s")],
            Permission::Granted,
            CoordinatorOptions::default(),
        );

        let mut fired_at = Vec::new();
        for minute in 0..16 {
            let now = at(8, 55) + chrono::Duration::minutes(minute);
            if coord.poll_at(now).await.fired > 0 {
                fired_at.push(now.format("%H:%M").to_string());
            }
        }
        assert_eq!(fired_at, vec!["09:00", "09:05", "09:10"]);
        assert_eq!(coord.gate().channel().alerts().len(), 3);
    }

    #[tokio::test]
    async fn zero_interval_never_fires_nor_crashes() {
        let coord = coordinator(
            vec![
                HabitRecord::new("Broken", "09:00", 0),
                HabitRecord::new("Fine", "09:00", 1),
            ],
            Permission::Granted,
            CoordinatorOptions::default(),
        );

        for minute in 0..5 {
            let report = coord.poll_at(at(9, minute)).await;
            assert_eq!(report.invalid, 1);
            assert_eq!(report.fired_names(), vec!["Fine"]);
        }
        let progress = coord.progress().await;
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].0, HabitKey("name:Fine".into()));
    }

    #[tokio::test]
    async fn malformed_anchor_does_not_block_other_habits() {
        let mut missing = HabitRecord::new("NoAnchor", "09:00", 5);
        missing.start_time = None;
        let coord = coordinator(
            vec![
                HabitRecord::new("Garbled", "nine o'clock", 5),
                missing,
                HabitRecord::new("Good", "09:00", 5),
            ],
            Permission::Granted,
            CoordinatorOptions::default(),
        );

        let report = coord.poll_at(at(9, 0)).await;
        assert_eq!(report.invalid, 2);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.fired_names(), vec!["Good"]);
    }

    #[tokio::test]
    async fn same_name_shares_one_entry_in_name_mode() {
        let options = CoordinatorOptions {
            identity: IdentityMode::Name,
            ..CoordinatorOptions::default()
        };
        let coord = coordinator(
            vec![
                HabitRecord::new("Read", "09:00", 5).with_id("a"),
                HabitRecord::new("Read", "09:00", 5).with_id("b"),
            ],
            Permission::Granted,
            options,
        );

        let report = coord.poll_at(at(9, 0)).await;
        assert_eq!(coord.progress().await.len(), 1);
        // The second record sees the boundary already fired by the first.
        assert_eq!(report.fired, 1);
    }

    #[tokio::test]
    async fn distinct_ids_keep_separate_entries() {
        let coord = coordinator(
            vec![
                HabitRecord::new("Read", "09:00", 5).with_id("a"),
                HabitRecord::new("Read", "09:00", 5).with_id("b"),
            ],
            Permission::Granted,
            CoordinatorOptions::default(),
        );

        let report = coord.poll_at(at(9, 0)).await;
        assert_eq!(coord.progress().await.len(), 2);
        assert_eq!(report.fired, 2);
    }

    #[tokio::test]
    async fn denied_permission_drops_fire_then_later_boundary_delivers() {
        let coord = coordinator(
            vec![HabitRecord::new("Water", "09:00", 5).with_id("w")],
            Permission::Denied,
            CoordinatorOptions::default(),
        );

        let report = coord.poll_at(at(9, 0)).await;
        assert_eq!((report.fired, report.dropped, report.delivered), (1, 1, 0));
        assert_eq!(coord.progress().await[0].1.elapsed_count, 0);

        coord.gate().channel().set_permission(Permission::Granted);
        for minute in 1..5 {
            assert_eq!(coord.poll_at(at(9, minute)).await.fired, 0);
        }
        let report = coord.poll_at(at(9, 5)).await;
        assert_eq!((report.fired, report.delivered), (1, 1));
        assert_eq!(coord.gate().channel().alerts().len(), 1);
    }

    #[tokio::test]
    async fn stale_entries_evicted_after_one_cycle() {
        let source = Arc::new(InMemorySource::new(vec![
            HabitRecord::new("Keep", "09:00", 5).with_id("k"),
            HabitRecord::new("Drop", "09:00", 5).with_id("d"),
        ]));
        let coord = PollCoordinator::new(
            source.clone(),
            DispatchGate::new(RecordingChannel::new(Permission::Granted)),
            CoordinatorOptions::default(),
        );

        coord.poll_at(at(9, 0)).await;
        source.set(vec![HabitRecord::new("Keep", "09:00", 5).with_id("k")]);

        assert_eq!(coord.poll_at(at(9, 5)).await.evicted, 0);
        let report = coord.poll_at(at(9, 6)).await;
        assert_eq!(report.evicted, 1);
        assert_eq!(coord.progress().await.len(), 1);
    }

    #[tokio::test]
    async fn priming_marks_past_boundaries_without_alerting() {
        let coord = coordinator(
            vec![HabitRecord::new("Stretch", "09:00", 5).with_id("s")],
            Permission::Granted,
            CoordinatorOptions::default(),
        );

        let primed = coord.prime_at(at(9, 3)).await;
        assert_eq!(primed.delivered, 0);
        assert!(coord.gate().channel().alerts().is_empty());

        assert_eq!(coord.poll_at(at(9, 4)).await.fired, 0);
        assert_eq!(coord.poll_at(at(9, 5)).await.delivered, 1);
    }

    #[tokio::test]
    async fn priming_is_a_no_op_for_tick_counting() {
        let coord = coordinator(
            vec![HabitRecord::new("Stretch", "09:00", 2).with_id("s")],
            Permission::Granted,
            CoordinatorOptions {
                cadence: Cadence::TickCount,
                ..CoordinatorOptions::default()
            },
        );
        coord.prime_at(at(9, 0)).await;
        assert!(coord.progress().await.is_empty());
        assert_eq!(coord.poll_at(at(9, 0)).await.fired, 0);
        assert_eq!(coord.poll_at(at(9, 1)).await.fired, 1);
    }

    #[tokio::test]
    async fn eviction_can_be_disabled() {
        let source = Arc::new(InMemorySource::new(vec![HabitRecord::new("Gone", "09:00", 1)]));
        let coord = PollCoordinator::new(
            source.clone(),
            DispatchGate::new(RecordingChannel::new(Permission::Granted)),
            CoordinatorOptions {
                evict_stale: false,
                ..CoordinatorOptions::default()
            },
        );
        coord.poll_at(at(9, 0)).await;
        source.set(Vec::new());
        coord.poll_at(at(12, 0)).await;
        assert_eq!(coord.progress().await.len(), 1);
    }
}

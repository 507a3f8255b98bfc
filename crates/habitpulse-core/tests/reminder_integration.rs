//! Integration tests for the reminder engine.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use habitpulse_core::{
    Cadence, CoordinatorOptions, DispatchGate, HabitDb, HabitKey, HabitRecord, HabitSource,
    IdentityMode, InMemorySource, OverlapPolicy, Permission, PollCoordinator, ProgressStore,
    RecordingChannel, SourceError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Barrier, Notify, Semaphore};

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 10)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// Source whose fetches block until the test hands out permits.
struct GatedSource {
    habits: InMemorySource,
    permits: Semaphore,
    entered: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetches: AtomicUsize,
}

impl GatedSource {
    fn new(habits: Vec<HabitRecord>) -> Self {
        Self {
            habits: InMemorySource::new(habits),
            permits: Semaphore::new(0),
            entered: Notify::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }
}

impl HabitSource for GatedSource {
    async fn list_habits(&self) -> Result<Vec<HabitRecord>, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        permit.forget();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.habits.list_habits().await
    }
}

/// Source that can be switched into failing.
struct FlakySource {
    habits: InMemorySource,
    fail: AtomicBool,
}

impl HabitSource for FlakySource {
    async fn list_habits(&self) -> Result<Vec<HabitRecord>, SourceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("backend offline".into()));
        }
        self.habits.list_habits().await
    }
}

/// Source that never answers.
struct HangingSource;

impl HabitSource for HangingSource {
    async fn list_habits(&self) -> Result<Vec<HabitRecord>, SourceError> {
        std::future::pending().await
    }
}

/// One pass over a store shared without a pass-wide lock: the entry is
/// read, advanced on a copy and written back as separate steps.
async fn unsynchronized_pass(
    store: Arc<std::sync::Mutex<ProgressStore>>,
    both_read: Arc<Barrier>,
    habit: HabitRecord,
    now: NaiveDateTime,
) -> bool {
    let key = habit.key(IdentityMode::Id);
    let schedule = habit.schedule().unwrap();
    let mut entry = store
        .lock()
        .unwrap()
        .touch(&key, now, schedule.interval_minutes.get())
        .clone();
    both_read.wait().await;

    let fired = Cadence::WallClock
        .advance(&mut entry, &schedule, now)
        .is_fire();
    *store
        .lock()
        .unwrap()
        .touch(&key, now, schedule.interval_minutes.get()) = entry;
    fired
}

#[tokio::test]
async fn interleaved_passes_without_exclusion_double_fire() {
    let store = Arc::new(std::sync::Mutex::new(ProgressStore::new()));
    let both_read = Arc::new(Barrier::new(2));
    let habit = HabitRecord::new("Stretch", "09:00", 5).with_id("s");

    let first = tokio::spawn(unsynchronized_pass(
        store.clone(),
        both_read.clone(),
        habit.clone(),
        at(9, 0),
    ));
    let second = tokio::spawn(unsynchronized_pass(
        store.clone(),
        both_read,
        habit,
        at(9, 0),
    ));

    // Both passes saw "not fired yet" for the 09:00 boundary.
    assert!(first.await.unwrap());
    assert!(second.await.unwrap());
}

#[tokio::test]
async fn concurrent_passes_on_coordinator_fire_once() {
    let coord = Arc::new(PollCoordinator::new(
        InMemorySource::new(vec![HabitRecord::new("Stretch", "09:00", 5).with_id("s")]),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions {
            overlap: OverlapPolicy::Queue,
            ..CoordinatorOptions::default()
        },
    ));

    let passes: Vec<_> = (0..2)
        .map(|_| {
            let coord = coord.clone();
            tokio::spawn(async move { coord.poll_at(at(9, 0)).await })
        })
        .collect();
    let mut fired = 0;
    for pass in passes {
        fired += pass.await.unwrap().fired;
    }
    assert_eq!(fired, 1);
}

#[tokio::test]
async fn overlapping_tick_is_dropped_under_skip_policy() {
    let source = Arc::new(GatedSource::new(vec![
        HabitRecord::new("Stretch", "09:00", 5).with_id("s"),
    ]));
    let coord = Arc::new(PollCoordinator::new(
        source.clone(),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions::default(),
    ));

    let first = tokio::spawn({
        let coord = coord.clone();
        async move { coord.poll_at(at(9, 0)).await }
    });
    source.entered.notified().await;

    let second = coord.poll_at(at(9, 0)).await;
    assert!(second.skipped);
    assert_eq!(second.fired, 0);

    source.permits.add_permits(1);
    let first = first.await.unwrap();
    assert!(!first.skipped);
    assert_eq!(first.fired, 1);

    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(coord.gate().channel().alerts().len(), 1);
}

#[tokio::test]
async fn overlapping_tick_runs_after_under_queue_policy() {
    let source = Arc::new(GatedSource::new(vec![
        HabitRecord::new("Stretch", "09:00", 5).with_id("s"),
    ]));
    let coord = Arc::new(PollCoordinator::new(
        source.clone(),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions {
            overlap: OverlapPolicy::Queue,
            ..CoordinatorOptions::default()
        },
    ));

    let first = tokio::spawn({
        let coord = coord.clone();
        async move { coord.poll_at(at(9, 0)).await }
    });
    source.entered.notified().await;
    let second = tokio::spawn({
        let coord = coord.clone();
        async move { coord.poll_at(at(9, 0)).await }
    });
    tokio::task::yield_now().await;

    source.permits.add_permits(2);
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert!(!first.skipped && !second.skipped);
    assert_eq!(first.fired + second.fired, 1);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(coord.gate().channel().alerts().len(), 1);
}

#[tokio::test]
async fn queued_tick_counting_advances_once_per_pass() {
    let source = Arc::new(GatedSource::new(vec![
        HabitRecord::new("Water", "09:00", 2).with_id("w"),
    ]));
    let coord = Arc::new(PollCoordinator::new(
        source.clone(),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions {
            cadence: Cadence::TickCount,
            overlap: OverlapPolicy::Queue,
            ..CoordinatorOptions::default()
        },
    ));

    let passes: Vec<_> = (0..4)
        .map(|i| {
            let coord = coord.clone();
            tokio::spawn(async move { coord.poll_at(at(9, i)).await })
        })
        .collect();
    source.permits.add_permits(4);

    let mut fired = 0;
    for pass in passes {
        fired += pass.await.unwrap().fired;
    }
    // Four one-minute ticks with interval 2: exactly two fires.
    assert_eq!(fired, 2);
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_failure_skips_tick_and_keeps_progress() {
    let source = Arc::new(FlakySource {
        habits: InMemorySource::new(vec![HabitRecord::new("Read", "09:00", 1).with_id("r")]),
        fail: AtomicBool::new(false),
    });
    let coord = PollCoordinator::new(
        source.clone(),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions::default(),
    );

    assert_eq!(coord.poll_at(at(9, 0)).await.fired, 1);

    source.fail.store(true, Ordering::SeqCst);
    let report = coord.poll_at(at(10, 0)).await;
    assert!(report.fetch_error.as_deref().unwrap().contains("backend offline"));
    assert_eq!(report.evaluated, 0);
    // A failed fetch must not look like "every habit was deleted".
    assert_eq!(report.evicted, 0);
    assert_eq!(coord.progress().await.len(), 1);

    source.fail.store(false, Ordering::SeqCst);
    assert_eq!(coord.poll_at(at(10, 1)).await.fired, 1);
}

#[tokio::test]
async fn hanging_fetch_is_bounded_by_timeout() {
    let coord = PollCoordinator::new(
        HangingSource,
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions {
            fetch_timeout: std::time::Duration::from_millis(20),
            ..CoordinatorOptions::default()
        },
    );

    let report = coord.poll_at(at(9, 0)).await;
    assert!(report.fetch_error.as_deref().unwrap().contains("timed out"));
    assert!(!report.skipped);

    // The store lock was released; the next tick runs normally.
    let report = coord.poll_at(at(9, 1)).await;
    assert!(!report.skipped);
}

#[tokio::test]
async fn delivery_failure_does_not_rearm_or_stop_others() {
    let channel = Arc::new(RecordingChannel::new(Permission::Granted));
    channel.set_failing(true);
    let coord = PollCoordinator::new(
        InMemorySource::new(vec![
            HabitRecord::new("A", "09:00", 5).with_id("a"),
            HabitRecord::new("B", "09:00", 5).with_id("b"),
        ]),
        DispatchGate::new(channel.clone()),
        CoordinatorOptions::default(),
    );

    let report = coord.poll_at(at(9, 0)).await;
    assert_eq!((report.fired, report.failed), (2, 2));

    channel.set_failing(false);
    assert_eq!(coord.poll_at(at(9, 1)).await.fired, 0);
    assert_eq!(coord.poll_at(at(9, 5)).await.delivered, 2);
}

#[tokio::test]
async fn before_anchor_nothing_accumulates() {
    let coord = PollCoordinator::new(
        InMemorySource::new(vec![HabitRecord::new("Evening", "18:00", 1).with_id("e")]),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions {
            cadence: Cadence::TickCount,
            ..CoordinatorOptions::default()
        },
    );

    let mut now = at(17, 0);
    while now < at(18, 0) {
        let report = coord.poll_at(now).await;
        assert_eq!(report.fired, 0);
        assert_eq!(coord.progress().await[0].1.elapsed_count, 0);
        now += Duration::minutes(1);
    }
    assert_eq!(coord.poll_at(at(18, 0)).await.fired, 1);
}

#[tokio::test]
async fn database_source_end_to_end() {
    let db = Arc::new(HabitDb::open_memory().unwrap());
    let id = db
        .add_habit(&HabitRecord::new("Stretch", "09:00", 5))
        .unwrap();
    let coord = PollCoordinator::new(
        db.clone(),
        DispatchGate::new(Arc::new(RecordingChannel::new(Permission::Granted))),
        CoordinatorOptions::default(),
    );

    assert_eq!(coord.poll_at(at(9, 0)).await.fired_names(), vec!["Stretch"]);
    coord.poll_at(at(9, 2)).await;

    // Renaming keeps progress when identity follows the id.
    db.rename(&id, "Stretch legs").unwrap();
    let report = coord.poll_at(at(9, 3)).await;
    assert_eq!(report.fired, 0);
    let progress = coord.progress().await;
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].0, HabitKey(format!("id:{id}")));
    assert_eq!(progress[0].1.elapsed_count, 3);

    assert_eq!(coord.poll_at(at(9, 5)).await.fired_names(), vec!["Stretch legs"]);
    let alerts = coord.gate().channel().alerts();
    assert_eq!(alerts[1].1, "Time for: Stretch legs 🚀");

    // Deleted habits are forgotten after one full interval.
    db.remove(&id).unwrap();
    coord.poll_at(at(9, 10)).await;
    assert_eq!(coord.poll_at(at(9, 11)).await.evicted, 1);
    assert!(coord.progress().await.is_empty());
}

#[tokio::test]
async fn renaming_restarts_progress_in_name_mode() {
    let db = Arc::new(HabitDb::open_memory().unwrap());
    let id = db.add_habit(&HabitRecord::new("Read", "09:00", 5)).unwrap();
    let coord = PollCoordinator::new(
        db.clone(),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions {
            identity: IdentityMode::Name,
            ..CoordinatorOptions::default()
        },
    );

    coord.poll_at(at(9, 0)).await;
    db.rename(&id, "Read more").unwrap();
    // A new identity has no fired boundary yet, so it fires on its latest one.
    let report = coord.poll_at(at(9, 2)).await;
    assert_eq!(report.fired_names(), vec!["Read more"]);
    assert_eq!(coord.progress().await.len(), 2);
}

#[tokio::test]
async fn locked_database_fetch_is_bounded_by_timeout() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("habits.db");
    let db = Arc::new(HabitDb::open_at(&path).unwrap());
    db.add_habit(&HabitRecord::new("Stretch", "09:00", 5)).unwrap();

    let locker = rusqlite::Connection::open(&path).unwrap();
    locker.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let coord = PollCoordinator::new(
        db.clone(),
        DispatchGate::new(RecordingChannel::new(Permission::Granted)),
        CoordinatorOptions {
            fetch_timeout: std::time::Duration::from_secs(1),
            ..CoordinatorOptions::default()
        },
    );

    let started = Instant::now();
    let report = coord.poll_at(at(9, 0)).await;
    let elapsed = started.elapsed();
    assert!(report.fetch_error.as_deref().unwrap().contains("timed out"));
    // Well under SQLite's own five second busy wait.
    assert!(elapsed < std::time::Duration::from_secs(3), "took {elapsed:?}");

    locker.execute_batch("ROLLBACK").unwrap();
    let report = coord.poll_at(at(9, 5)).await;
    assert!(report.fetch_error.is_none());
    assert_eq!(report.fired_names(), vec!["Stretch"]);
}

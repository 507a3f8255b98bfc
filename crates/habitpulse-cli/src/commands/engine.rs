//! Reminder engine commands: a single pass, or the poll loop.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use clap::Args;
use habitpulse_core::{
    AnchorTime, Cadence, Config, DispatchGate, HabitDb, NotificationChannel, PassReport, PollCoordinator,
    PollDriver,
};
use std::sync::Arc;

use crate::channels;

type Coordinator = PollCoordinator<HabitDb, Box<dyn NotificationChannel>>;

#[derive(Args)]
pub struct TickArgs {
    /// Evaluate as if the local clock read this time (HH:MM)
    #[arg(long)]
    at: Option<AnchorTime>,
    /// Date to evaluate on (YYYY-MM-DD, default: today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Output the pass report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,
    /// Print every pass report as a JSON line
    #[arg(long)]
    json: bool,
}

fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    config.validate()?;
    Ok(config)
}

fn build_coordinator(config: &Config) -> Result<Coordinator, Box<dyn std::error::Error>> {
    let db = HabitDb::open()?;
    let gate = DispatchGate::new(channels::from_config(&config.notifications))
        .with_title(config.notifications.title.clone())
        .with_enabled(config.notifications.enabled);
    Ok(PollCoordinator::new(db, gate, config.coordinator_options()))
}

fn evaluation_time(args: &TickArgs) -> Result<NaiveDateTime, Box<dyn std::error::Error>> {
    let now = Local::now().naive_local();
    let date = args.date.unwrap_or(now.date());
    let minute = match args.at {
        Some(at) => at.minute_of_day(),
        None => habitpulse_core::reminder::clock::minute_of_day(now),
    };
    date.and_hms_opt(minute / 60, minute % 60, 0)
        .ok_or_else(|| format!("invalid evaluation time {date} {minute}").into())
}

fn print_report(report: &PassReport) {
    if report.skipped {
        println!("pass skipped: another pass is running");
        return;
    }
    if let Some(err) = &report.fetch_error {
        println!("fetch failed: {err}");
        return;
    }
    println!(
        "evaluated {} habit(s), {} fired ({} delivered, {} dropped, {} failed), {} invalid",
        report.evaluated,
        report.fired,
        report.delivered,
        report.dropped,
        report.failed,
        report.invalid
    );
    for name in report.fired_names() {
        println!("  fired: {name}");
    }
}

/// One pass of a fresh engine at the given minute.
///
/// The engine is primed one minute earlier, so only habits with a boundary
/// exactly on that minute fire, as they would under continuous polling.
/// Tick counting has no notion of "a boundary on this minute" without the
/// ticks before it, so it is refused.
pub async fn tick(args: TickArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    if config.poll.cadence == Cadence::TickCount {
        return Err(
            "tick requires poll.cadence = \"wall_clock\"; tick_count progress only exists inside `run`"
                .into(),
        );
    }
    let coordinator = build_coordinator(&config)?;
    let now = evaluation_time(&args)?;

    coordinator.prime_at(now - Duration::minutes(1)).await;
    let report = coordinator.poll_at(now).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if let Some(err) = report.fetch_error {
        return Err(err.into());
    }
    Ok(())
}

/// Poll until Ctrl-C or the tick limit.
pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let coordinator = Arc::new(build_coordinator(&config)?);
    let driver = PollDriver::new(coordinator, config.driver_options(args.ticks));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let json = args.json;
    let summary = driver
        .run(shutdown, |report| {
            if json {
                match serde_json::to_string(report) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "cannot serialize pass report"),
                }
            } else if report.fired > 0 || report.fetch_error.is_some() {
                print_report(report);
            }
        })
        .await;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "stopped after {} tick(s): {} fired, {} delivered, {} skipped, {} fetch failure(s)",
            summary.ticks, summary.fired, summary.delivered, summary.skipped, summary.fetch_failures
        );
    }
    Ok(())
}

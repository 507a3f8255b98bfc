//! Habit management commands for CLI.

use clap::Subcommand;
use habitpulse_core::{HabitDb, HabitRecord};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Add a habit
    Add {
        /// Habit name, shown in the alert
        name: String,
        /// Anchor time of day (HH:MM)
        #[arg(long)]
        start: String,
        /// Repeat interval in minutes
        #[arg(long)]
        every: i64,
        /// Free-text description
        #[arg(long, default_value = "")]
        description: String,
        /// Category label
        #[arg(long)]
        category: Option<String>,
        /// Explicit id (default: random UUID)
        #[arg(long)]
        id: Option<String>,
    },
    /// List habits
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a habit
    Rename {
        /// Habit ID
        id: String,
        /// New name
        name: String,
    },
    /// Remove a habit
    Remove {
        /// Habit ID
        id: String,
    },
    /// Remove every habit
    Purge,
}

pub fn run(action: HabitAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = HabitDb::open()?;
    match action {
        HabitAction::Add {
            name,
            start,
            every,
            description,
            category,
            id,
        } => {
            let mut habit = HabitRecord::new(name, &start, every);
            habit.description = description;
            habit.category = category;
            habit.id = id;
            // The engine tolerates bad rows, but there is no reason to store one.
            let schedule = habit.schedule()?;
            let id = db.add_habit(&habit)?;
            println!(
                "habit added: {id} ({} every {} min from {})",
                habit.name, schedule.interval_minutes, schedule.anchor
            );
        }
        HabitAction::List { json } => {
            let habits = db.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&habits)?);
            } else if habits.is_empty() {
                println!("no habits");
            } else {
                for habit in &habits {
                    println!(
                        "{}  {}  {} every {} min",
                        habit.id.as_deref().unwrap_or("-"),
                        habit.name,
                        habit.start_time.as_deref().unwrap_or("--:--"),
                        habit.duration
                    );
                }
            }
        }
        HabitAction::Rename { id, name } => {
            db.rename(&id, &name)?;
            println!("habit renamed: {id}");
        }
        HabitAction::Remove { id } => {
            db.remove(&id)?;
            println!("habit removed: {id}");
        }
        HabitAction::Purge => {
            let removed = db.purge()?;
            println!("{removed} habit(s) removed");
        }
    }
    Ok(())
}

//! lifeline CLI - personal goal and habit tracker.

mod config;

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use config::CliConfig;
use lifeline_core::{
    CompletionType, DatedNote, EntryFields, Frequency, GoalFilter, GoalId, GoalNode, GoalPatch,
    GoalStatus, HabitDayStatus, HabitFilter, HabitId, NewCheckIn, NewGoal, NewHabit, NoteId,
    Time, ValueId, WeekdaySet,
};
use lifeline_goals::{GoalHierarchyManager, GoalProgressAggregator, NoteService, ValueService};
use lifeline_habits::{HabitAnalyticsEngine, HabitService};
use lifeline_storage::JsonStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lifeline")]
#[command(about = "Personal goal and habit tracker", long_about = None)]
struct Cli {
    /// Data directory
    #[arg(long, env = "LIFELINE_DIR", default_value = ".lifeline")]
    data_dir: PathBuf,

    /// Log debug output from the lifeline crates
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage goals
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Manage habits
    #[command(subcommand)]
    Habit(HabitCommand),
    /// Manage personal values
    #[command(subcommand)]
    Value(ValueCommand),
    /// Manage day notes
    #[command(subcommand)]
    Note(NoteCommand),
    /// Show activity markers and notes for a period
    Calendar {
        /// First day (YYYY-MM-DD)
        start: NaiveDate,
        /// Last day (YYYY-MM-DD)
        end: NaiveDate,
    },
}

#[derive(Subcommand)]
enum GoalCommand {
    /// Add a goal
    Add {
        /// Goal name
        name: String,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        target: Option<NaiveDate>,
        /// Parent goal ID
        #[arg(long)]
        parent: Option<GoalId>,
        /// Value IDs this goal serves
        #[arg(long = "value")]
        values: Vec<ValueId>,
        /// Supporting habit IDs
        #[arg(long = "habit")]
        habits: Vec<HabitId>,
    },
    /// List goals
    List {
        /// Show the hierarchy
        #[arg(long)]
        tree: bool,
    },
    /// Show goal details
    Show {
        /// Goal ID
        id: GoalId,
    },
    /// Move a goal under another goal, or to the root without --parent
    Move {
        /// Goal ID
        id: GoalId,
        /// New parent goal ID
        #[arg(long)]
        parent: Option<GoalId>,
    },
    /// Change goal status
    Status {
        /// Goal ID
        id: GoalId,
        /// not_started, in_progress, completed, on_hold or cancelled
        status: GoalStatus,
    },
    /// Delete a goal with its sub-goals and check-ins
    Delete {
        /// Goal ID
        id: GoalId,
    },
    /// Record a check-in
    CheckIn {
        /// Goal ID
        id: GoalId,
        /// Progress percentage (0-100)
        #[arg(long)]
        progress: f64,
        /// Reflection
        #[arg(long, default_value = "")]
        reflection: String,
        /// Notes
        #[arg(long)]
        notes: Option<String>,
        /// Contributing habit IDs
        #[arg(long = "habit")]
        habits: Vec<HabitId>,
    },
    /// List unfinished goals due soon
    DueSoon {
        /// Look-ahead in days (defaults to the configured value)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
enum HabitCommand {
    /// Add a habit
    Add {
        /// Habit name
        name: String,
        /// daily, weekly, monthly or specific_days
        #[arg(long, default_value = "daily")]
        frequency: Frequency,
        /// Weekday indices for specific_days, Monday = 0 (e.g. "0,2,4")
        #[arg(long)]
        days: Option<WeekdaySet>,
        /// binary, quantitative or duration
        #[arg(long = "type", default_value = "binary")]
        completion_type: CompletionType,
        /// Target amount for measured habits
        #[arg(long)]
        target: Option<f64>,
        /// Unit of the target amount
        #[arg(long)]
        unit: Option<String>,
    },
    /// List habits with today's status
    List {
        /// Include inactive habits
        #[arg(long)]
        all: bool,
    },
    /// Log a habit for a day
    Log {
        /// Habit ID
        id: HabitId,
        /// Day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Measured amount
        #[arg(long)]
        value: Option<f64>,
        /// Notes
        #[arg(long)]
        notes: Option<String>,
        /// Record the day as not completed
        #[arg(long)]
        missed: bool,
    },
    /// Show streak, completion rate and trend
    Stats {
        /// Habit ID
        id: HabitId,
        /// Reference day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Delete a habit with its entries
    Delete {
        /// Habit ID
        id: HabitId,
    },
}

#[derive(Subcommand)]
enum ValueCommand {
    /// Add a value
    Add {
        /// Value name
        name: String,
        /// Description
        #[arg(long)]
        description: Option<String>,
    },
    /// List values
    List,
}

#[derive(Subcommand)]
enum NoteCommand {
    /// Add a note to a day
    Add {
        /// Note text
        content: String,
        /// Day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List notes of one day, of a period, or all of them
    List {
        /// Single day (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<NaiveDate>,
        /// First day of a period (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        /// Last day of a period (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },
    /// Delete a note
    Delete {
        /// Note ID
        id: NoteId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CliConfig::load(&cli.data_dir)?;
    debug!("Opening store at {}", cli.data_dir.display());
    let storage = Arc::new(Mutex::new(JsonStorage::new(&cli.data_dir).await?));

    match cli.command {
        Commands::Goal(command) => run_goal(command, storage, &config).await,
        Commands::Habit(command) => run_habit(command, storage, &config).await,
        Commands::Value(command) => run_value(command, storage).await,
        Commands::Note(command) => run_note(command, storage).await,
        Commands::Calendar { start, end } => {
            let notes = NoteService::new(storage.clone());
            let progress = GoalProgressAggregator::with_config(storage, config.progress);
            let activity = progress.dates_with_activity_in_period(start, end).await?;

            println!("Activity {} .. {}", start, end);
            for (label, dates) in [
                ("Goal targets", &activity.goal_target_dates),
                ("Check-ins", &activity.checkin_dates),
                ("Habit entries", &activity.habit_entry_dates),
                ("Notes", &activity.note_dates),
            ] {
                let days: Vec<String> = dates.iter().map(NaiveDate::to_string).collect();
                let days = if days.is_empty() { "-".to_string() } else { days.join(", ") };
                println!("  {}: {}", label, days);
            }
            for note in notes.notes_in_period(start, end).await? {
                print_note(&note);
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "lifeline=debug,warn" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_goal(
    command: GoalCommand,
    storage: Arc<Mutex<JsonStorage>>,
    config: &CliConfig,
) -> Result<()> {
    let goals = GoalHierarchyManager::new(storage.clone());

    match command {
        GoalCommand::Add {
            name,
            description,
            target,
            parent,
            values,
            habits,
        } => {
            let goal = goals
                .create_goal(NewGoal {
                    name,
                    description,
                    target_date: target.map(start_of_day),
                    parent_id: parent,
                    value_ids: values,
                    habit_ids: habits,
                    ..Default::default()
                })
                .await?;
            println!("Added goal: {} - {}", goal.id, goal.name);
        }
        GoalCommand::List { tree } => {
            if tree {
                for node in goals.goal_tree().await? {
                    print_node(&node, 1);
                }
            } else {
                let all = goals.list_goals(&GoalFilter::default()).await?;
                println!("Goals ({})", all.len());
                for goal in all {
                    println!(
                        "  {} | {} | {} - {}",
                        goal.id,
                        format_status(goal.status),
                        format_target(goal.target_date),
                        goal.name
                    );
                }
            }
        }
        GoalCommand::Show { id } => {
            let progress = GoalProgressAggregator::with_config(storage, config.progress.clone());
            let Some(summary) = progress.progress_summary(id).await? else {
                println!("Goal not found");
                return Ok(());
            };
            let goal = &summary.goal;

            println!("Goal: {}", goal.id);
            println!("  Name: {}", goal.name);
            if !goal.description.is_empty() {
                println!("  Description: {}", goal.description);
            }
            println!("  Status: {}", format_status(goal.status));
            println!("  Target: {}", format_target(goal.target_date));
            if let Some(parent) = goal.parent_id {
                println!("  Parent: {}", parent);
            }
            for child in goals.sub_goals(id).await? {
                println!("  Sub-goal: {} - {}", child.id, child.name);
            }
            for value in goals.goal_values(id).await? {
                println!("  Value: {}", value.name);
            }
            for habit in goals.supporting_habits(id).await? {
                println!("  Habit: {} - {}", habit.id, habit.name);
            }
            println!("  Check-ins: {}", summary.total_check_ins);
            for check_in in summary.history.iter().take(5) {
                println!(
                    "    {} | {:>5.1}% | {}",
                    check_in.check_in_date.format("%Y-%m-%d"),
                    check_in.progress_percentage,
                    check_in.reflection
                );
            }
        }
        GoalCommand::Move { id, parent } => {
            let patch = GoalPatch {
                parent_id: Some(parent),
                ..Default::default()
            };
            let goal = goals.update_goal(id, patch).await?;
            match goal.parent_id {
                Some(parent) => println!("Moved {} under {}", goal.id, parent),
                None => println!("Moved {} to the root", goal.id),
            }
        }
        GoalCommand::Status { id, status } => {
            let goal = goals.update_goal_status(id, status).await?;
            println!("{} is now {}", goal.name, format_status(goal.status));
        }
        GoalCommand::Delete { id } => {
            if goals.delete_goal(id).await? {
                println!("Deleted goal {}", id);
            } else {
                println!("Goal not found");
            }
        }
        GoalCommand::CheckIn {
            id,
            progress,
            reflection,
            notes,
            habits,
        } => {
            let check_in = goals
                .create_check_in(
                    id,
                    NewCheckIn {
                        reflection,
                        progress_percentage: progress,
                        notes,
                        check_in_date: None,
                        contributing_habit_ids: habits,
                    },
                )
                .await?;
            println!(
                "Checked in: {} at {:.1}%",
                check_in.id, check_in.progress_percentage
            );
        }
        GoalCommand::DueSoon { days } => {
            let progress = GoalProgressAggregator::with_config(storage, config.progress.clone());
            let days = days.unwrap_or(progress.config().due_soon_days);
            let due = progress.goals_due_soon(days, Utc::now()).await?;

            println!("Due within {} days ({})", days, due.len());
            for goal in due {
                println!(
                    "  {} | {} | {}",
                    format_target(goal.target_date),
                    format_status(goal.status),
                    goal.name
                );
            }
        }
    }
    Ok(())
}

async fn run_habit(
    command: HabitCommand,
    storage: Arc<Mutex<JsonStorage>>,
    config: &CliConfig,
) -> Result<()> {
    let habits = HabitService::new(storage.clone());
    let today = Utc::now().date_naive();

    match command {
        HabitCommand::Add {
            name,
            frequency,
            days,
            completion_type,
            target,
            unit,
        } => {
            if frequency == Frequency::SpecificDays && days.map_or(true, |d| d.is_empty()) {
                bail!("--days is required for specific_days habits");
            }
            let mut new = NewHabit::new(name, frequency);
            new.specific_days_of_week = days.unwrap_or_default();
            new.completion_type = completion_type;
            new.target_value = target;
            new.unit = unit;

            let habit = habits.create_habit(new).await?;
            println!(
                "Added habit: {} - {} ({})",
                habit.id, habit.name, habit.frequency
            );
        }
        HabitCommand::List { all } => {
            let filter = if all {
                HabitFilter::default()
            } else {
                HabitFilter::active()
            };
            let list = habits.list_habits(&filter).await?;

            println!("Habits ({})", list.len());
            for habit in list {
                let status = habits.day_status(habit.id, today).await?;
                println!(
                    "  {} | {} | {} - {}",
                    habit.id,
                    format_day_status(status),
                    habit.frequency,
                    habit.name
                );
            }
        }
        HabitCommand::Log {
            id,
            date,
            value,
            notes,
            missed,
        } => {
            let date = date.unwrap_or(today);
            let fields = EntryFields {
                completed: !missed,
                value,
                notes,
            };
            let entry = habits.record_entry(id, date, fields).await?;
            println!(
                "Logged {} on {}: {}",
                id,
                entry.completion_date,
                if entry.completed { "done" } else { "missed" }
            );
        }
        HabitCommand::Stats { id, as_of } => {
            let as_of = as_of.unwrap_or(today);
            let analytics = HabitAnalyticsEngine::with_config(storage, config.analytics.clone());
            let stats = analytics.habit_stats(id, as_of).await?;
            let trend: String = stats
                .trend
                .iter()
                .map(|done| if *done { '#' } else { '.' })
                .collect();

            println!("Habit {} as of {}", id, as_of);
            println!("  Current streak: {} days", stats.current_streak);
            println!(
                "  Completion rate ({} days): {:.1}%",
                analytics.config().rate_window_days,
                stats.completion_rate
            );
            println!("  Trend: {}", trend);
        }
        HabitCommand::Delete { id } => {
            if habits.delete_habit(id).await? {
                println!("Deleted habit {}", id);
            } else {
                println!("Habit not found");
            }
        }
    }
    Ok(())
}

async fn run_value(command: ValueCommand, storage: Arc<Mutex<JsonStorage>>) -> Result<()> {
    let values = ValueService::new(storage);

    match command {
        ValueCommand::Add { name, description } => {
            let value = values.create_value(name, description).await?;
            println!("Added value: {} - {}", value.id, value.name);
        }
        ValueCommand::List => {
            let list = values.list_values().await?;
            println!("Values ({})", list.len());
            for value in list {
                println!("  {} - {}", value.id, value.name);
            }
        }
    }
    Ok(())
}

async fn run_note(command: NoteCommand, storage: Arc<Mutex<JsonStorage>>) -> Result<()> {
    let notes = NoteService::new(storage);

    match command {
        NoteCommand::Add { content, date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let note = notes.save_note_for_date(date, content).await?;
            println!("Added note: {} for {}", note.id, note.note_date);
        }
        NoteCommand::List { date, from, to } => {
            let list = match (date, from, to) {
                (Some(date), _, _) => notes.notes_for_date(date).await?,
                (None, Some(from), Some(to)) => notes.notes_in_period(from, to).await?,
                _ => notes.all_notes().await?,
            };
            println!("Notes ({})", list.len());
            for note in &list {
                print_note(note);
            }
        }
        NoteCommand::Delete { id } => {
            if notes.delete_note(id).await? {
                println!("Deleted note {}", id);
            } else {
                println!("Note not found");
            }
        }
    }
    Ok(())
}

fn print_note(note: &DatedNote) {
    println!("  {} | {} - {}", note.note_date, note.id, note.content);
}

fn print_node(node: &GoalNode, depth: usize) {
    println!(
        "{}{} | {} - {}",
        "  ".repeat(depth),
        node.goal.id,
        format_status(node.goal.status),
        node.goal.name
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn start_of_day(date: NaiveDate) -> Time {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn format_target(target: Option<Time>) -> String {
    target.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d").to_string())
}

fn format_status(status: GoalStatus) -> &'static str {
    match status {
        GoalStatus::NotStarted => "NOT STARTED",
        GoalStatus::InProgress => "IN PROGRESS",
        GoalStatus::Completed => "COMPLETED",
        GoalStatus::OnHold => "ON HOLD",
        GoalStatus::Cancelled => "CANCELLED",
    }
}

fn format_day_status(status: HabitDayStatus) -> &'static str {
    match status {
        HabitDayStatus::NotDue => "NOT DUE",
        HabitDayStatus::Completed => "DONE",
        HabitDayStatus::InProgress => "PARTIAL",
        HabitDayStatus::Pending => "PENDING",
    }
}

//! lifeline core data models.
//!
//! This crate defines the records of the goal/habit tracker, the query
//! filters every storage backend understands, and the shared error type.

#![warn(missing_docs)]

// Core identities
mod error;
mod id;

// Goals and values
mod goal;
mod note;
mod value;

// Habits
mod habit;

// Persistence support
mod filter;
mod link;

// Re-exports
pub use error::{require_name, Error, Result};
pub use id::*;

// Goals & Values
pub use goal::{
    validate_progress, CheckInPatch, Goal, GoalCheckIn, GoalNode, GoalOption, GoalPatch,
    GoalStatus, NewCheckIn, NewGoal,
};
pub use note::DatedNote;
pub use value::{Value, ValuePatch};

// Habits
pub use habit::{
    validate_amount, CompletionType, EntryFields, Frequency, Habit, HabitDayStatus, HabitEntry,
    HabitGoal, HabitPatch, HabitStatus, NewHabit, NewHabitGoal, WeekdaySet,
};

// Queries & Associations
pub use filter::{
    CheckInFilter, EntryFilter, GoalFilter, GoalOrder, HabitFilter, NoteFilter, SortOrder,
};
pub use link::{Association, Link, LinkEnd};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

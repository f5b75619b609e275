//! Goal Management
//!
//! Goal hierarchy, check-ins, personal values, day notes and progress
//! aggregation.

#![warn(missing_docs)]

pub mod hierarchy;
pub mod notes;
pub mod progress;
pub mod values;

pub use hierarchy::GoalHierarchyManager;
pub use notes::NoteService;
pub use progress::{ActivityDates, GoalProgressAggregator, GoalProgressSummary, ProgressConfig};
pub use values::ValueService;

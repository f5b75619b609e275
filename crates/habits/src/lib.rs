//! Habit Tracking
//!
//! Recurrence scheduling, daily logging and completion analytics.

#![warn(missing_docs)]

pub mod analytics;
pub mod scheduler;
pub mod service;

pub use analytics::{
    rate_from_entries, streak_from_entries, trend_from_entries, AnalyticsConfig,
    HabitAnalyticsEngine, HabitStats, HeatmapDay,
};
pub use scheduler::{day_status, days_between, due_dates, is_due_on};
pub use service::HabitService;

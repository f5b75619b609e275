//! Habit analytics: streaks, completion rates, trends and calendar heatmaps.
//!
//! The `*_from_entries` functions are pure and do the actual arithmetic;
//! [`HabitAnalyticsEngine`] loads the habit and its entries from the store and
//! hands them over.

use crate::scheduler::{days_between, is_due_on};
use chrono::{Days, NaiveDate};
use lifeline_core::{EntryFilter, Error, Habit, HabitEntry, HabitId, Result};
use lifeline_storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Window of the completion rate reported by [`HabitAnalyticsEngine::habit_stats`]
    pub rate_window_days: u32,

    /// Number of days in the trend reported by [`HabitAnalyticsEngine::habit_stats`]
    pub trend_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            rate_window_days: 30,
            trend_days: 7,
        }
    }
}

/// Streak, rate and trend of one habit as of a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitStats {
    /// Consecutive completed days ending at the reference day
    pub current_streak: u32,
    /// Percentage of due days completed in the configured window
    pub completion_rate: f64,
    /// Completion flags of the trailing days, oldest first
    pub trend: Vec<bool>,
}

/// One cell of a habit calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapDay {
    /// Calendar day
    pub date: NaiveDate,
    /// Whether the habit was scheduled
    pub due: bool,
    /// Whether a completed entry exists
    pub completed: bool,
    /// Logged amount, if any
    pub value: Option<f64>,
}

/// Number of consecutive days ending at `as_of` that have a completed entry.
///
/// Only the existence of a completed entry counts; the recurrence rule is not
/// consulted, so a weekly habit's streak breaks on its off days.
pub fn streak_from_entries(entries: &[HabitEntry], as_of: NaiveDate) -> u32 {
    let done = completed_dates(entries);
    let mut streak = 0;
    let mut day = as_of;
    while done.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Percentage of due days in the trailing window that were completed.
///
/// The window covers `window_days` days ending at `as_of`, clipped to the
/// habit's creation day. Returns 0 when the window holds no due day.
pub fn rate_from_entries(
    habit: &Habit,
    entries: &[HabitEntry],
    window_days: u32,
    as_of: NaiveDate,
) -> f64 {
    let Some(window_start) = window_start(as_of, window_days) else {
        return 0.0;
    };
    let start = window_start.max(habit.created_at.date_naive());

    let done = completed_dates(entries);
    let (mut due, mut completed) = (0u32, 0u32);
    for day in days_between(start, as_of) {
        if is_due_on(habit, day) {
            due += 1;
            if done.contains(&day) {
                completed += 1;
            }
        }
    }

    debug!("Habit {}: {} of {} due days completed", habit.id, completed, due);
    if due == 0 {
        return 0.0;
    }
    f64::from(completed) / f64::from(due) * 100.0
}

/// Completion flags for the `days` days ending at `as_of`, oldest first.
pub fn trend_from_entries(entries: &[HabitEntry], days: u32, as_of: NaiveDate) -> Vec<bool> {
    let Some(start) = window_start(as_of, days) else {
        return Vec::new();
    };
    let done = completed_dates(entries);
    days_between(start, as_of).map(|day| done.contains(&day)).collect()
}

fn completed_dates(entries: &[HabitEntry]) -> BTreeSet<NaiveDate> {
    entries
        .iter()
        .filter(|e| e.completed)
        .map(|e| e.completion_date)
        .collect()
}

/// First day of a window of `days` days ending at `as_of`; `None` for an empty window.
fn window_start(as_of: NaiveDate, days: u32) -> Option<NaiveDate> {
    if days == 0 {
        return None;
    }
    Some(
        as_of
            .checked_sub_days(Days::new(u64::from(days) - 1))
            .unwrap_or(NaiveDate::MIN),
    )
}

/// Read-only analytics over habits and their entries.
pub struct HabitAnalyticsEngine<S: Storage> {
    storage: Arc<Mutex<S>>,
    config: AnalyticsConfig,
}

impl<S: Storage> HabitAnalyticsEngine<S> {
    /// Create a new engine with the default configuration.
    pub fn new(storage: Arc<Mutex<S>>) -> Self {
        Self::with_config(storage, AnalyticsConfig::default())
    }

    /// Create a new engine with a custom configuration.
    pub fn with_config(storage: Arc<Mutex<S>>, config: AnalyticsConfig) -> Self {
        Self { storage, config }
    }

    /// Get current configuration.
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Consecutive completed days ending at `as_of`.
    pub async fn current_streak(&self, habit_id: HabitId, as_of: NaiveDate) -> Result<u32> {
        let (_, entries) = self.load(habit_id, None, as_of).await?;
        Ok(streak_from_entries(&entries, as_of))
    }

    /// Percentage of due days completed over the `window_days` days ending at `as_of`.
    pub async fn completion_rate(
        &self,
        habit_id: HabitId,
        window_days: u32,
        as_of: NaiveDate,
    ) -> Result<f64> {
        let from = window_start(as_of, window_days);
        let (habit, entries) = self.load(habit_id, from, as_of).await?;
        Ok(rate_from_entries(&habit, &entries, window_days, as_of))
    }

    /// Completion flags of the `days` days ending at `as_of`, oldest first.
    pub async fn completion_trend(
        &self,
        habit_id: HabitId,
        days: u32,
        as_of: NaiveDate,
    ) -> Result<Vec<bool>> {
        let (_, entries) = self.load(habit_id, window_start(as_of, days), as_of).await?;
        Ok(trend_from_entries(&entries, days, as_of))
    }

    /// Entries of a habit within `[start, end]`, oldest first.
    pub async fn entries_in_period(
        &self,
        habit_id: HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HabitEntry>> {
        check_period(start, end)?;
        let storage = self.storage.lock().await;
        if storage.load_habit(habit_id).await?.is_none() {
            return Err(Error::not_found("habit", habit_id));
        }
        Ok(storage
            .list_entries(&EntryFilter::for_habit_between(habit_id, start, end))
            .await?)
    }

    /// Day-by-day calendar of a habit within `[start, end]`.
    pub async fn completion_heatmap(
        &self,
        habit_id: HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HeatmapDay>> {
        check_period(start, end)?;
        let (habit, entries) = self.load(habit_id, Some(start), end).await?;
        let by_date: BTreeMap<NaiveDate, &HabitEntry> =
            entries.iter().map(|e| (e.completion_date, e)).collect();

        Ok(days_between(start, end)
            .map(|date| {
                let entry = by_date.get(&date);
                HeatmapDay {
                    date,
                    due: is_due_on(&habit, date),
                    completed: entry.is_some_and(|e| e.completed),
                    value: entry.and_then(|e| e.value),
                }
            })
            .collect())
    }

    /// Streak, configured-window rate and configured-length trend as of `as_of`.
    pub async fn habit_stats(&self, habit_id: HabitId, as_of: NaiveDate) -> Result<HabitStats> {
        let (habit, entries) = self.load(habit_id, None, as_of).await?;
        let window_days = self.config.rate_window_days;
        Ok(HabitStats {
            current_streak: streak_from_entries(&entries, as_of),
            completion_rate: rate_from_entries(&habit, &entries, window_days, as_of),
            trend: trend_from_entries(&entries, self.config.trend_days, as_of),
        })
    }

    async fn load(
        &self,
        habit_id: HabitId,
        from: Option<NaiveDate>,
        until: NaiveDate,
    ) -> Result<(Habit, Vec<HabitEntry>)> {
        let storage = self.storage.lock().await;
        let habit = storage
            .load_habit(habit_id)
            .await?
            .ok_or_else(|| Error::not_found("habit", habit_id))?;
        let entries = storage
            .list_entries(&EntryFilter {
                habit_id: Some(habit_id),
                from,
                until: Some(until),
                ..Default::default()
            })
            .await?;
        Ok((habit, entries))
    }
}

fn check_period(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(Error::validation(format!("period start {start} is after end {end}")));
    }
    Ok(())
}

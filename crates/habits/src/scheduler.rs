//! Habit scheduling: whether a habit is due on a calendar date.
//!
//! Everything here is a pure function of its arguments. Both the daily
//! tracking views and the analytics engine go through [`is_due_on`], so the
//! recurrence semantics are defined in exactly one place.

use chrono::{Datelike, NaiveDate};
use lifeline_core::{Frequency, Habit, HabitDayStatus, HabitEntry, HabitStatus};

/// Whether `habit` is due on `date`.
///
/// Weekly habits fall on the weekday of `created_at`; monthly habits fall on
/// its day-of-month, so a habit created on the 31st is never due in shorter
/// months. Inactive habits are never due.
pub fn is_due_on(habit: &Habit, date: NaiveDate) -> bool {
    if habit.status != HabitStatus::Active {
        return false;
    }

    match habit.frequency {
        Frequency::Daily => true,
        Frequency::Weekly => date.weekday() == habit.created_at.weekday(),
        Frequency::Monthly => date.day() == habit.created_at.day(),
        Frequency::SpecificDays => habit.specific_days_of_week.contains(date.weekday()),
    }
}

/// Every date in `[start, end]` on which `habit` is due, oldest first.
pub fn due_dates(habit: &Habit, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    days_between(start, end)
        .filter(|date| is_due_on(habit, *date))
        .collect()
}

/// Calendar days in `[start, end]`, oldest first. Empty when `start > end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |date| *date <= end)
}

/// Display status of `habit` on `date`, given that day's entry if any.
pub fn day_status(habit: &Habit, entry: Option<&HabitEntry>, date: NaiveDate) -> HabitDayStatus {
    if !is_due_on(habit, date) {
        return HabitDayStatus::NotDue;
    }

    match entry {
        Some(entry) if entry.completed => HabitDayStatus::Completed,
        Some(_) if habit.completion_type.is_measured() => HabitDayStatus::InProgress,
        _ => HabitDayStatus::Pending,
    }
}

//! Query filters understood by every storage backend.
//!
//! Matching, ordering and limiting live here so that all backends answer a
//! query identically; a backend only has to hand over candidate records.

use crate::goal::{Goal, GoalCheckIn, GoalStatus};
use crate::habit::{Habit, HabitEntry, HabitStatus};
use crate::id::{GoalId, HabitId};
use crate::note::DatedNote;
use crate::Time;
use chrono::NaiveDate;

/// Sort direction for date-ordered queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first
    #[default]
    Ascending,
    /// Newest first
    Descending,
}

impl SortOrder {
    fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Sort key for goal queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GoalOrder {
    /// Alphabetical by name
    #[default]
    Name,
    /// By target date ascending, undated goals last
    TargetDate,
    /// By creation time ascending
    CreatedAt,
}

/// Filter for goal queries.
#[derive(Debug, Clone, Default)]
pub struct GoalFilter {
    /// `Some(Some(id))` = children of `id`, `Some(None)` = root goals
    pub parent: Option<Option<GoalId>>,

    /// Only these statuses
    pub status: Option<Vec<GoalStatus>>,

    /// Never these statuses
    pub exclude_status: Option<Vec<GoalStatus>>,

    /// Target date at or after this instant
    pub target_from: Option<Time>,

    /// Target date at or before this instant
    pub target_until: Option<Time>,

    /// Sort key
    pub order: GoalOrder,

    /// Maximum number of results
    pub limit: Option<usize>,
}

impl GoalFilter {
    /// Direct children of `parent`.
    pub fn children_of(parent: GoalId) -> Self {
        Self {
            parent: Some(Some(parent)),
            ..Default::default()
        }
    }

    /// Whether `goal` satisfies the predicate part of the filter.
    pub fn matches(&self, goal: &Goal) -> bool {
        if let Some(parent) = self.parent {
            if goal.parent_id != parent {
                return false;
            }
        }
        if let Some(statuses) = &self.status {
            if !statuses.contains(&goal.status) {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_status {
            if excluded.contains(&goal.status) {
                return false;
            }
        }
        if self.target_from.is_some() || self.target_until.is_some() {
            let Some(target) = goal.target_date else {
                return false;
            };
            if self.target_from.is_some_and(|from| target < from) {
                return false;
            }
            if self.target_until.is_some_and(|until| target > until) {
                return false;
            }
        }
        true
    }

    /// Filter, order and limit candidate goals.
    pub fn select(&self, goals: impl IntoIterator<Item = Goal>) -> Vec<Goal> {
        let mut selected: Vec<Goal> = goals.into_iter().filter(|g| self.matches(g)).collect();
        match self.order {
            GoalOrder::Name => selected.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
            GoalOrder::TargetDate => selected.sort_by(|a, b| {
                match (a.target_date, b.target_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then(a.id.cmp(&b.id))
            }),
            GoalOrder::CreatedAt => selected.sort_by_key(|g| (g.created_at, g.id)),
        }
        truncate(&mut selected, self.limit);
        selected
    }
}

/// Filter for goal check-in queries, ordered by check-in date.
#[derive(Debug, Clone, Default)]
pub struct CheckInFilter {
    /// Only check-ins of these goals
    pub goal_ids: Option<Vec<GoalId>>,

    /// Check-in date at or after this instant
    pub from: Option<Time>,

    /// Check-in date at or before this instant
    pub until: Option<Time>,

    /// Sort direction by check-in date
    pub order: SortOrder,

    /// Maximum number of results
    pub limit: Option<usize>,
}

impl CheckInFilter {
    /// All check-ins of `goal_id`, newest first.
    pub fn for_goal(goal_id: GoalId) -> Self {
        Self {
            goal_ids: Some(vec![goal_id]),
            order: SortOrder::Descending,
            ..Default::default()
        }
    }

    /// Whether `check_in` satisfies the predicate part of the filter.
    pub fn matches(&self, check_in: &GoalCheckIn) -> bool {
        if let Some(ids) = &self.goal_ids {
            if !ids.contains(&check_in.goal_id) {
                return false;
            }
        }
        if self.from.is_some_and(|from| check_in.check_in_date < from) {
            return false;
        }
        if self.until.is_some_and(|until| check_in.check_in_date > until) {
            return false;
        }
        true
    }

    /// Filter, order and limit candidate check-ins.
    pub fn select(&self, check_ins: impl IntoIterator<Item = GoalCheckIn>) -> Vec<GoalCheckIn> {
        let mut selected: Vec<GoalCheckIn> =
            check_ins.into_iter().filter(|c| self.matches(c)).collect();
        selected.sort_by(|a, b| {
            self.order
                .apply(a.check_in_date.cmp(&b.check_in_date).then(a.id.cmp(&b.id)))
        });
        truncate(&mut selected, self.limit);
        selected
    }
}

/// Filter for habit queries, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct HabitFilter {
    /// Only habits with this status
    pub status: Option<HabitStatus>,
}

impl HabitFilter {
    /// Active habits only.
    pub fn active() -> Self {
        Self {
            status: Some(HabitStatus::Active),
        }
    }

    /// Whether `habit` satisfies the filter.
    pub fn matches(&self, habit: &Habit) -> bool {
        self.status.map_or(true, |status| habit.status == status)
    }

    /// Filter and order candidate habits.
    pub fn select(&self, habits: impl IntoIterator<Item = Habit>) -> Vec<Habit> {
        let mut selected: Vec<Habit> = habits.into_iter().filter(|h| self.matches(h)).collect();
        selected.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        selected
    }
}

/// Filter for habit entry queries, ordered by completion date.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Only entries of this habit
    pub habit_id: Option<HabitId>,

    /// First day, inclusive
    pub from: Option<NaiveDate>,

    /// Last day, inclusive
    pub until: Option<NaiveDate>,

    /// Only entries marked completed
    pub completed_only: bool,

    /// Sort direction by completion date
    pub order: SortOrder,

    /// Maximum number of results
    pub limit: Option<usize>,
}

impl EntryFilter {
    /// Entries of `habit_id` in `[from, until]`, oldest first.
    pub fn for_habit_between(habit_id: HabitId, from: NaiveDate, until: NaiveDate) -> Self {
        Self {
            habit_id: Some(habit_id),
            from: Some(from),
            until: Some(until),
            ..Default::default()
        }
    }

    /// Whether `entry` satisfies the predicate part of the filter.
    pub fn matches(&self, entry: &HabitEntry) -> bool {
        if self.habit_id.is_some_and(|id| entry.habit_id != id) {
            return false;
        }
        if self.from.is_some_and(|from| entry.completion_date < from) {
            return false;
        }
        if self.until.is_some_and(|until| entry.completion_date > until) {
            return false;
        }
        !self.completed_only || entry.completed
    }

    /// Filter, order and limit candidate entries.
    pub fn select(&self, entries: impl IntoIterator<Item = HabitEntry>) -> Vec<HabitEntry> {
        let mut selected: Vec<HabitEntry> =
            entries.into_iter().filter(|e| self.matches(e)).collect();
        selected.sort_by(|a, b| {
            self.order
                .apply(a.completion_date.cmp(&b.completion_date).then(a.id.cmp(&b.id)))
        });
        truncate(&mut selected, self.limit);
        selected
    }
}

/// Filter for dated notes, ordered by note date then creation time.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    /// Note date on or after this day
    pub from: Option<NaiveDate>,

    /// Note date on or before this day
    pub until: Option<NaiveDate>,

    /// Sort direction
    pub order: SortOrder,

    /// Maximum number of results
    pub limit: Option<usize>,
}

impl NoteFilter {
    /// Notes of a single day, newest first.
    pub fn on_date(date: NaiveDate) -> Self {
        Self {
            from: Some(date),
            until: Some(date),
            order: SortOrder::Descending,
            limit: None,
        }
    }

    /// Whether `note` falls inside the date bounds.
    pub fn matches(&self, note: &DatedNote) -> bool {
        !(self.from.is_some_and(|from| note.note_date < from)
            || self.until.is_some_and(|until| note.note_date > until))
    }

    /// Filter, order and limit candidate notes.
    pub fn select(&self, notes: impl IntoIterator<Item = DatedNote>) -> Vec<DatedNote> {
        let mut selected: Vec<DatedNote> = notes.into_iter().filter(|n| self.matches(n)).collect();
        selected.sort_by(|a, b| {
            self.order.apply(
                a.note_date
                    .cmp(&b.note_date)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id)),
            )
        });
        truncate(&mut selected, self.limit);
        selected
    }
}

fn truncate<T>(items: &mut Vec<T>, limit: Option<usize>) {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn goal(name: &str, target: Option<Time>, status: GoalStatus) -> Goal {
        Goal {
            id: GoalId::new(),
            name: name.to_string(),
            description: String::new(),
            target_date: target,
            status,
            parent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_target_date_order_puts_undated_last() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let filter = GoalFilter {
            order: GoalOrder::TargetDate,
            ..Default::default()
        };
        let goals = vec![
            goal("undated", None, GoalStatus::NotStarted),
            goal("late", Some(late), GoalStatus::NotStarted),
            goal("early", Some(early), GoalStatus::NotStarted),
        ];
        let names: Vec<_> = filter.select(goals).into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["early", "late", "undated"]);
    }

    #[test]
    fn test_target_bounds_exclude_undated_goals() {
        let until = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let filter = GoalFilter {
            target_until: Some(until),
            exclude_status: Some(vec![GoalStatus::Completed]),
            ..Default::default()
        };
        assert!(!filter.matches(&goal("undated", None, GoalStatus::NotStarted)));
        assert!(filter.matches(&goal("due", Some(until), GoalStatus::InProgress)));
        assert!(!filter.matches(&goal("done", Some(until), GoalStatus::Completed)));
    }

    #[test]
    fn test_root_filter() {
        let filter = GoalFilter {
            parent: Some(None),
            ..Default::default()
        };
        let mut child = goal("child", None, GoalStatus::NotStarted);
        child.parent_id = Some(GoalId::new());
        assert!(!filter.matches(&child));
        assert!(filter.matches(&goal("root", None, GoalStatus::NotStarted)));
    }

    #[test]
    fn test_entry_filter_orders_and_limits() {
        let habit_id = HabitId::new();
        let entry = |day: u32, completed: bool| HabitEntry {
            id: crate::EntryId::new(),
            habit_id,
            completion_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            completed,
            value: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let filter = EntryFilter {
            habit_id: Some(habit_id),
            completed_only: true,
            order: SortOrder::Descending,
            limit: Some(2),
            ..Default::default()
        };
        let entries = vec![entry(1, true), entry(3, true), entry(2, false), entry(4, true)];
        let days: Vec<_> = filter
            .select(entries)
            .iter()
            .map(|e| e.completion_date.format("%d").to_string())
            .collect();
        assert_eq!(days, vec!["04", "03"]);
    }

    #[test]
    fn test_note_filter_orders_by_date_then_creation() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let note = |d: u32, hour: u32, content: &str| DatedNote {
            id: crate::NoteId::new(),
            note_date: day(d),
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 20, hour, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 20, hour, 0, 0).unwrap(),
        };
        let notes = vec![note(5, 9, "late"), note(2, 8, "b"), note(2, 7, "a"), note(9, 1, "out")];

        let filter = NoteFilter {
            from: Some(day(1)),
            until: Some(day(5)),
            ..Default::default()
        };
        let contents: Vec<_> = filter
            .select(notes.clone())
            .into_iter()
            .map(|n| n.content)
            .collect();
        assert_eq!(contents, vec!["a", "b", "late"]);

        let contents: Vec<_> = NoteFilter::on_date(day(2))
            .select(notes)
            .into_iter()
            .map(|n| n.content)
            .collect();
        assert_eq!(contents, vec!["b", "a"]);
    }
}

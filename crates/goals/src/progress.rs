//! Goal progress aggregation.
//!
//! Read-only summaries over goals, their check-ins and habit activity:
//! check-in history, due-soon listings, dashboard goals and calendar markers.

use chrono::{Duration, NaiveDate};
use lifeline_core::{
    CheckInFilter, EntryFilter, Error, Goal, GoalCheckIn, GoalFilter, GoalId, GoalOrder,
    GoalStatus, NoteFilter, Result, SortOrder, Time,
};
use lifeline_storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Progress aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Look-ahead used for due-soon listings
    pub due_soon_days: u32,

    /// Number of goals shown on the dashboard (0 = all)
    pub dashboard_limit: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            due_soon_days: 7,
            dashboard_limit: 5,
        }
    }
}

/// Check-in history of one goal.
#[derive(Debug, Clone, Serialize)]
pub struct GoalProgressSummary {
    /// The goal
    pub goal: Goal,
    /// Most recent check-in
    pub latest_check_in: Option<GoalCheckIn>,
    /// Number of check-ins
    pub total_check_ins: usize,
    /// All check-ins, newest first
    pub history: Vec<GoalCheckIn>,
}

/// Days carrying activity markers in a calendar period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityDates {
    /// Days on which some goal is targeted
    pub goal_target_dates: BTreeSet<NaiveDate>,
    /// Days with at least one goal check-in
    pub checkin_dates: BTreeSet<NaiveDate>,
    /// Days with at least one completed habit entry
    pub habit_entry_dates: BTreeSet<NaiveDate>,
    /// Days with at least one dated note
    pub note_dates: BTreeSet<NaiveDate>,
}

/// Goal progress aggregator.
pub struct GoalProgressAggregator<S: Storage> {
    storage: Arc<Mutex<S>>,
    config: ProgressConfig,
}

impl<S: Storage> GoalProgressAggregator<S> {
    /// Create a new aggregator with the default configuration.
    pub fn new(storage: Arc<Mutex<S>>) -> Self {
        Self::with_config(storage, ProgressConfig::default())
    }

    /// Create a new aggregator with a custom configuration.
    pub fn with_config(storage: Arc<Mutex<S>>, config: ProgressConfig) -> Self {
        Self { storage, config }
    }

    /// Get current configuration.
    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Check-ins of a goal, newest first, optionally bounded.
    pub async fn check_ins_for_goal(
        &self,
        goal_id: GoalId,
        start: Option<Time>,
        end: Option<Time>,
    ) -> Result<Vec<GoalCheckIn>> {
        let filter = CheckInFilter {
            from: start,
            until: end,
            ..CheckInFilter::for_goal(goal_id)
        };
        Ok(self.storage.lock().await.list_check_ins(&filter).await?)
    }

    /// Goal with its check-in history, or `None` when the goal does not exist.
    pub async fn progress_summary(&self, goal_id: GoalId) -> Result<Option<GoalProgressSummary>> {
        let storage = self.storage.lock().await;
        let Some(goal) = storage.load_goal(goal_id).await? else {
            return Ok(None);
        };
        let history = storage.list_check_ins(&CheckInFilter::for_goal(goal_id)).await?;

        Ok(Some(GoalProgressSummary {
            goal,
            latest_check_in: history.first().cloned(),
            total_check_ins: history.len(),
            history,
        }))
    }

    /// Unfinished goals whose target date is at most `within_days` after `now`,
    /// overdue ones included, soonest first. Goals without a target date are
    /// never due. A look-ahead past the last representable instant is unbounded.
    pub async fn goals_due_soon(&self, within_days: u32, now: Time) -> Result<Vec<Goal>> {
        let horizon = now.checked_add_signed(Duration::days(i64::from(within_days)));
        let filter = GoalFilter {
            exclude_status: Some(vec![GoalStatus::Completed]),
            target_until: horizon,
            order: GoalOrder::TargetDate,
            ..Default::default()
        };
        let goals = self.storage.lock().await.list_goals(&filter).await?;
        match horizon {
            Some(horizon) => debug!("{} goals due before {}", goals.len(), horizon),
            None => debug!("{} dated goals still open", goals.len()),
        }
        Ok(goals)
    }

    /// Goals targeted on `date` (UTC).
    pub async fn goals_by_target_date(&self, date: NaiveDate) -> Result<Vec<Goal>> {
        let filter = GoalFilter {
            order: GoalOrder::TargetDate,
            ..Default::default()
        };
        let goals = self.storage.lock().await.list_goals(&filter).await?;
        Ok(goals
            .into_iter()
            .filter(|g| g.target_date.is_some_and(|t| t.date_naive() == date))
            .collect())
    }

    /// Check-ins made on `date` (UTC) across all goals, oldest first.
    pub async fn check_ins_on_date(&self, date: NaiveDate) -> Result<Vec<GoalCheckIn>> {
        let check_ins = self
            .storage
            .lock()
            .await
            .list_check_ins(&CheckInFilter {
                order: SortOrder::Ascending,
                ..Default::default()
            })
            .await?;
        Ok(check_ins
            .into_iter()
            .filter(|c| c.check_in_date.date_naive() == date)
            .collect())
    }

    /// Open goals (not started or in progress) by target date, undated last.
    /// A `limit` of 0 returns them all.
    pub async fn dashboard_summary_goals(&self, limit: usize) -> Result<Vec<Goal>> {
        let filter = GoalFilter {
            status: Some(vec![GoalStatus::NotStarted, GoalStatus::InProgress]),
            order: GoalOrder::TargetDate,
            limit: (limit > 0).then_some(limit),
            ..Default::default()
        };
        Ok(self.storage.lock().await.list_goals(&filter).await?)
    }

    /// Dashboard goals using the configured limit.
    pub async fn dashboard_goals(&self) -> Result<Vec<Goal>> {
        self.dashboard_summary_goals(self.config.dashboard_limit).await
    }

    /// Goals due within the configured look-ahead.
    pub async fn upcoming_goals(&self, now: Time) -> Result<Vec<Goal>> {
        self.goals_due_soon(self.config.due_soon_days, now).await
    }

    /// Days in `[start, end]` carrying calendar markers: goal targets,
    /// check-ins, completed habit entries and notes.
    pub async fn dates_with_activity_in_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ActivityDates> {
        if start > end {
            return Err(Error::validation(format!("period start {start} is after end {end}")));
        }
        let in_period = |date: NaiveDate| start <= date && date <= end;

        let storage = self.storage.lock().await;
        let goal_target_dates = storage
            .list_goals(&GoalFilter::default())
            .await?
            .into_iter()
            .filter_map(|g| g.target_date.map(|t| t.date_naive()))
            .filter(|d| in_period(*d))
            .collect();
        let checkin_dates = storage
            .list_check_ins(&CheckInFilter::default())
            .await?
            .into_iter()
            .map(|c| c.check_in_date.date_naive())
            .filter(|d| in_period(*d))
            .collect();
        let habit_entry_dates = storage
            .list_entries(&EntryFilter {
                from: Some(start),
                until: Some(end),
                completed_only: true,
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|e| e.completion_date)
            .collect();
        let note_dates = storage
            .list_notes(&NoteFilter {
                from: Some(start),
                until: Some(end),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|n| n.note_date)
            .collect();

        Ok(ActivityDates {
            goal_target_dates,
            checkin_dates,
            habit_entry_dates,
            note_dates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lifeline_core::{
        CheckInId, CompletionType, DatedNote, EntryId, Frequency, Habit, HabitEntry, HabitId,
        HabitStatus, NoteId, WeekdaySet,
    };
    use lifeline_storage::JsonStorage;

    fn at(y: i32, m: u32, d: u32) -> Time {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

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

    fn check_in(goal: &Goal, on: Time, progress: f64) -> GoalCheckIn {
        GoalCheckIn {
            id: CheckInId::new(),
            goal_id: goal.id,
            check_in_date: on,
            reflection: String::new(),
            progress_percentage: progress,
            notes: None,
            created_at: on,
            updated_at: on,
        }
    }

    async fn aggregator(
        goals: &[Goal],
        check_ins: &[GoalCheckIn],
    ) -> GoalProgressAggregator<JsonStorage> {
        let mut storage = JsonStorage::in_memory();
        storage.begin().await.unwrap();
        for g in goals {
            storage.save_goal(g).await.unwrap();
        }
        for c in check_ins {
            storage.save_check_in(c).await.unwrap();
        }
        storage.commit("seed").await.unwrap();
        GoalProgressAggregator::new(Arc::new(Mutex::new(storage)))
    }

    #[tokio::test]
    async fn test_progress_summary() {
        let g = goal("Write a book", None, GoalStatus::InProgress);
        let first = check_in(&g, at(2024, 1, 1), 10.0);
        let second = check_in(&g, at(2024, 2, 1), 35.0);
        let agg = aggregator(&[g.clone()], &[first, second.clone()]).await;

        let summary = agg.progress_summary(g.id).await.unwrap().unwrap();
        assert_eq!(summary.total_check_ins, 2);
        assert_eq!(summary.latest_check_in, Some(second));
        assert!(agg.progress_summary(GoalId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_ins_for_goal_bounds() {
        let g = goal("Learn piano", None, GoalStatus::InProgress);
        let cis = [
            check_in(&g, at(2024, 1, 1), 5.0),
            check_in(&g, at(2024, 1, 15), 10.0),
            check_in(&g, at(2024, 2, 1), 20.0),
        ];
        let agg = aggregator(&[g.clone()], &cis).await;

        let all = agg.check_ins_for_goal(g.id, None, None).await.unwrap();
        let progress: Vec<_> = all.iter().map(|c| c.progress_percentage).collect();
        assert_eq!(progress, vec![20.0, 10.0, 5.0]);

        let bounded = agg
            .check_ins_for_goal(g.id, Some(at(2024, 1, 10)), Some(at(2024, 1, 31)))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].progress_percentage, 10.0);
    }

    #[tokio::test]
    async fn test_goals_due_soon() {
        let now = at(2024, 3, 1);
        let overdue = goal("overdue", Some(at(2024, 2, 20)), GoalStatus::InProgress);
        let soon = goal("soon", Some(at(2024, 3, 5)), GoalStatus::NotStarted);
        let later = goal("later", Some(at(2024, 4, 1)), GoalStatus::NotStarted);
        let done = goal("done", Some(at(2024, 3, 2)), GoalStatus::Completed);
        let undated = goal("undated", None, GoalStatus::NotStarted);
        let agg = aggregator(&[overdue, soon, later, done, undated], &[]).await;

        let names: Vec<_> = agg
            .goals_due_soon(7, now)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["overdue", "soon"]);
        assert_eq!(agg.upcoming_goals(now).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_goals_due_soon_with_huge_look_ahead() {
        let now = at(2024, 3, 1);
        let goals = vec![
            goal("soon", Some(at(2024, 3, 5)), GoalStatus::NotStarted),
            goal("distant", Some(at(9999, 12, 31)), GoalStatus::InProgress),
            goal("done", Some(at(2024, 3, 2)), GoalStatus::Completed),
            goal("undated", None, GoalStatus::NotStarted),
        ];
        let agg = aggregator(&goals, &[]).await;

        let names: Vec<_> = agg
            .goals_due_soon(u32::MAX, now)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["soon", "distant"]);
    }

    #[tokio::test]
    async fn test_dashboard_summary_goals() {
        let goals = vec![
            goal("undated", None, GoalStatus::InProgress),
            goal("june", Some(at(2024, 6, 1)), GoalStatus::NotStarted),
            goal("march", Some(at(2024, 3, 1)), GoalStatus::InProgress),
            goal("held", Some(at(2024, 1, 1)), GoalStatus::OnHold),
        ];
        let agg = aggregator(&goals, &[]).await;

        let names: Vec<_> = agg
            .dashboard_summary_goals(0)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["march", "june", "undated"]);
        assert_eq!(agg.dashboard_summary_goals(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_goals_and_check_ins_on_date() {
        let g = goal("Trip", Some(at(2024, 5, 10)), GoalStatus::NotStarted);
        let ci = check_in(&g, at(2024, 5, 3), 50.0);
        let agg = aggregator(&[g.clone()], &[ci]).await;

        assert_eq!(agg.goals_by_target_date(date(2024, 5, 10)).await.unwrap().len(), 1);
        assert!(agg.goals_by_target_date(date(2024, 5, 11)).await.unwrap().is_empty());
        assert_eq!(agg.check_ins_on_date(date(2024, 5, 3)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dates_with_activity() {
        let g = goal("Trip", Some(at(2024, 5, 10)), GoalStatus::NotStarted);
        let outside = goal("Far", Some(at(2024, 8, 1)), GoalStatus::NotStarted);
        let ci = check_in(&g, at(2024, 5, 3), 50.0);
        let agg = aggregator(&[g, outside], &[ci]).await;

        let habit = Habit {
            id: HabitId::new(),
            name: "Pack".to_string(),
            description: String::new(),
            frequency: Frequency::Daily,
            specific_days_of_week: WeekdaySet::EMPTY,
            completion_type: CompletionType::Binary,
            target_value: None,
            unit: None,
            status: HabitStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let entry = |day: u32, completed: bool| HabitEntry {
            id: EntryId::new(),
            habit_id: habit.id,
            completion_date: date(2024, 5, day),
            completed,
            value: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        {
            let mut s = agg.storage.lock().await;
            s.begin().await.unwrap();
            s.save_habit(&habit).await.unwrap();
            s.save_entry(&entry(4, true)).await.unwrap();
            s.save_entry(&entry(5, false)).await.unwrap();
            for day in [date(2024, 5, 7), date(2024, 6, 1)] {
                let note = DatedNote {
                    id: NoteId::new(),
                    note_date: day,
                    content: "packing list".to_string(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                s.save_note(&note).await.unwrap();
            }
            s.commit("seed entries").await.unwrap();
        }

        let activity = agg
            .dates_with_activity_in_period(date(2024, 5, 1), date(2024, 5, 31))
            .await
            .unwrap();
        assert_eq!(activity.goal_target_dates, BTreeSet::from([date(2024, 5, 10)]));
        assert_eq!(activity.checkin_dates, BTreeSet::from([date(2024, 5, 3)]));
        assert_eq!(activity.habit_entry_dates, BTreeSet::from([date(2024, 5, 4)]));
        assert_eq!(activity.note_dates, BTreeSet::from([date(2024, 5, 7)]));

        let reversed = agg
            .dates_with_activity_in_period(date(2024, 5, 31), date(2024, 5, 1))
            .await;
        assert!(matches!(reversed, Err(Error::Validation(_))));
    }
}

//! Habit management service: habit CRUD, daily logging and habit goals.

use crate::scheduler;
use chrono::{NaiveDate, Utc};
use lifeline_core::{
    require_name, validate_amount, Association, EntryFields, EntryFilter, EntryId, Error,
    Frequency, GoalId, Habit, HabitDayStatus, HabitEntry, HabitFilter, HabitGoal, HabitGoalId,
    HabitId, HabitPatch, LinkEnd, NewHabit, NewHabitGoal, Result, WeekdaySet,
};
use lifeline_storage::{settle, Storage};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Habit management service.
///
/// Every mutation runs as one unit of work on the shared store while holding
/// its lock.
pub struct HabitService<S: Storage> {
    storage: Arc<Mutex<S>>,
}

impl<S: Storage> HabitService<S> {
    /// Create a new habit service over a shared store.
    pub fn new(storage: Arc<Mutex<S>>) -> Self {
        Self { storage }
    }

    /// Create a habit.
    pub async fn create_habit(&self, new: NewHabit) -> Result<Habit> {
        require_name("habit name", &new.name)?;
        let target_value = validate_amount("target value", new.target_value)?;

        let now = Utc::now();
        let habit = Habit {
            id: HabitId::new(),
            name: new.name,
            description: new.description,
            frequency: new.frequency,
            specific_days_of_week: if new.frequency == Frequency::SpecificDays {
                new.specific_days_of_week
            } else {
                WeekdaySet::EMPTY
            },
            completion_type: new.completion_type,
            target_value,
            unit: new.unit,
            status: new.status,
            created_at: now,
            updated_at: now,
        };

        let mut storage = self.storage.lock().await;
        storage.begin().await?;
        let outcome = storage.save_habit(&habit).await.map_err(Error::from);
        settle(&mut *storage, outcome, "create habit").await?;

        debug!("Created habit {} ({})", habit.id, habit.frequency);
        Ok(habit)
    }

    /// Load a habit by ID.
    pub async fn get_habit(&self, id: HabitId) -> Result<Option<Habit>> {
        Ok(self.storage.lock().await.load_habit(id).await?)
    }

    /// List habits matching the filter, ordered by name.
    pub async fn list_habits(&self, filter: &HabitFilter) -> Result<Vec<Habit>> {
        Ok(self.storage.lock().await.list_habits(filter).await?)
    }

    /// All active habits, ordered by name.
    pub async fn active_habits(&self) -> Result<Vec<Habit>> {
        self.list_habits(&HabitFilter::active()).await
    }

    /// Apply a partial update to a habit.
    pub async fn update_habit(&self, id: HabitId, patch: HabitPatch) -> Result<Habit> {
        let mut storage = self.storage.lock().await;
        let mut habit = storage
            .load_habit(id)
            .await?
            .ok_or_else(|| Error::not_found("habit", id))?;

        patch.apply(&mut habit)?;
        habit.updated_at = Utc::now();

        storage.begin().await?;
        let outcome = storage.save_habit(&habit).await.map_err(Error::from);
        settle(&mut *storage, outcome, "update habit").await?;
        Ok(habit)
    }

    /// Delete a habit together with its entries and habit goals.
    ///
    /// Goal and check-in links to the habit are cleared; the goals and
    /// check-ins themselves are untouched. Returns `false` when the habit does
    /// not exist.
    pub async fn delete_habit(&self, id: HabitId) -> Result<bool> {
        let mut storage = self.storage.lock().await;
        if storage.load_habit(id).await?.is_none() {
            warn!("Habit {} not found for deletion", id);
            return Ok(false);
        }

        storage.begin().await?;
        let outcome = Self::delete_habit_rows(&mut *storage, id).await;
        let (entries, goals) = settle(&mut *storage, outcome, "delete habit").await?;

        info!(
            "Deleted habit {} with {} entries and {} habit goals",
            id, entries, goals
        );
        Ok(true)
    }

    async fn delete_habit_rows(storage: &mut S, id: HabitId) -> Result<(usize, usize)> {
        let entries = storage.delete_entries_for_habit(id).await?;
        let goals = storage.delete_habit_goals_for_habit(id).await?;
        let end = LinkEnd::Right(id.as_ulid());
        storage.clear_links(Association::GoalHabit, end).await?;
        storage.clear_links(Association::CheckInHabit, end).await?;
        storage.delete_habit(id).await?;
        Ok((entries, goals))
    }

    /// Record the log for `habit_id` on `date`.
    ///
    /// If an entry already exists for that day its fields are overwritten;
    /// otherwise a new entry is created. Lookup and write happen in the same
    /// unit of work, so a day never ends up with two entries.
    pub async fn record_entry(
        &self,
        habit_id: HabitId,
        date: NaiveDate,
        fields: EntryFields,
    ) -> Result<HabitEntry> {
        validate_amount("entry value", fields.value)?;

        let mut storage = self.storage.lock().await;
        storage.begin().await?;
        let outcome = Self::upsert_entry(&mut *storage, habit_id, date, fields).await;
        settle(&mut *storage, outcome, "record habit entry").await
    }

    async fn upsert_entry(
        storage: &mut S,
        habit_id: HabitId,
        date: NaiveDate,
        fields: EntryFields,
    ) -> Result<HabitEntry> {
        if storage.load_habit(habit_id).await?.is_none() {
            return Err(Error::not_found("habit", habit_id));
        }

        let now = Utc::now();
        let existing = storage
            .list_entries(&EntryFilter::for_habit_between(habit_id, date, date))
            .await?
            .into_iter()
            .next();

        let entry = match existing {
            Some(mut entry) => {
                entry.completed = fields.completed;
                entry.value = fields.value;
                entry.notes = fields.notes;
                entry.updated_at = now;
                debug!("Updating entry {} for habit {} on {}", entry.id, habit_id, date);
                entry
            }
            None => HabitEntry {
                id: EntryId::new(),
                habit_id,
                completion_date: date,
                completed: fields.completed,
                value: fields.value,
                notes: fields.notes,
                created_at: now,
                updated_at: now,
            },
        };

        storage.save_entry(&entry).await?;
        Ok(entry)
    }

    /// The entry of `habit_id` on `date`, if one was logged.
    pub async fn entry_on_date(
        &self,
        habit_id: HabitId,
        date: NaiveDate,
    ) -> Result<Option<HabitEntry>> {
        let storage = self.storage.lock().await;
        Ok(storage
            .list_entries(&EntryFilter::for_habit_between(habit_id, date, date))
            .await?
            .into_iter()
            .next())
    }

    /// Every entry logged on `date`, paired with its habit, ordered by habit name.
    pub async fn entries_on_date(&self, date: NaiveDate) -> Result<Vec<(Habit, HabitEntry)>> {
        let storage = self.storage.lock().await;
        let entries = storage
            .list_entries(&EntryFilter {
                from: Some(date),
                until: Some(date),
                ..Default::default()
            })
            .await?;

        let mut pairs = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(habit) = storage.load_habit(entry.habit_id).await? {
                pairs.push((habit, entry));
            }
        }
        pairs.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(pairs)
    }

    /// Display status of a habit on `date`.
    pub async fn day_status(&self, habit_id: HabitId, date: NaiveDate) -> Result<HabitDayStatus> {
        let habit = self
            .get_habit(habit_id)
            .await?
            .ok_or_else(|| Error::not_found("habit", habit_id))?;
        if !scheduler::is_due_on(&habit, date) {
            return Ok(HabitDayStatus::NotDue);
        }
        let entry = self.entry_on_date(habit_id, date).await?;
        Ok(scheduler::day_status(&habit, entry.as_ref(), date))
    }

    /// Goals this habit supports.
    pub async fn supporting_goals(&self, habit_id: HabitId) -> Result<Vec<GoalId>> {
        let storage = self.storage.lock().await;
        let ids = storage
            .linked(Association::GoalHabit, LinkEnd::Right(habit_id.as_ulid()))
            .await?;
        Ok(ids.into_iter().map(GoalId::from).collect())
    }

    // === Habit goals ===

    /// Attach a long-horizon target to a habit.
    pub async fn create_habit_goal(
        &self,
        habit_id: HabitId,
        new: NewHabitGoal,
    ) -> Result<HabitGoal> {
        let target_value = validate_amount("target value", new.target_value)?;

        let mut storage = self.storage.lock().await;
        if storage.load_habit(habit_id).await?.is_none() {
            return Err(Error::not_found("habit", habit_id));
        }

        let now = Utc::now();
        let goal = HabitGoal {
            id: HabitGoalId::new(),
            habit_id,
            description: new.description,
            target_date: new.target_date,
            target_value,
            current_value: 0.0,
            completed: false,
            created_at: now,
            updated_at: now,
        };

        storage.begin().await?;
        let outcome = storage.save_habit_goal(&goal).await.map_err(Error::from);
        settle(&mut *storage, outcome, "create habit goal").await?;
        Ok(goal)
    }

    /// Habit goals of a habit, oldest first.
    pub async fn habit_goals(&self, habit_id: HabitId) -> Result<Vec<HabitGoal>> {
        Ok(self.storage.lock().await.list_habit_goals(habit_id).await?)
    }

    /// Mark a habit goal as reached or not.
    pub async fn set_habit_goal_completion(
        &self,
        id: HabitGoalId,
        completed: bool,
    ) -> Result<HabitGoal> {
        self.modify_habit_goal(id, |goal| {
            goal.completed = completed;
            Ok(())
        })
        .await
    }

    /// Record the amount reached so far. Reaching the target marks the goal
    /// completed; falling below it does not reopen it.
    pub async fn update_habit_goal_progress(
        &self,
        id: HabitGoalId,
        current_value: f64,
    ) -> Result<HabitGoal> {
        validate_amount("current value", Some(current_value))?;
        self.modify_habit_goal(id, |goal| {
            goal.current_value = current_value;
            if goal.target_value.is_some_and(|target| current_value >= target) {
                goal.completed = true;
            }
            Ok(())
        })
        .await
    }

    async fn modify_habit_goal<F>(&self, id: HabitGoalId, change: F) -> Result<HabitGoal>
    where
        F: FnOnce(&mut HabitGoal) -> Result<()>,
    {
        let mut storage = self.storage.lock().await;
        let mut goal = storage
            .load_habit_goal(id)
            .await?
            .ok_or_else(|| Error::not_found("habit goal", id))?;
        change(&mut goal)?;
        goal.updated_at = Utc::now();

        storage.begin().await?;
        let outcome = storage.save_habit_goal(&goal).await.map_err(Error::from);
        settle(&mut *storage, outcome, "update habit goal").await?;
        Ok(goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_core::{CompletionType, Goal, GoalStatus};
    use lifeline_storage::testing::{Fault, FaultyStorage};
    use lifeline_storage::JsonStorage;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service() -> (HabitService<JsonStorage>, Arc<Mutex<JsonStorage>>) {
        let storage = Arc::new(Mutex::new(JsonStorage::in_memory()));
        (HabitService::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_create_habit_rejects_blank_name() {
        let (service, _) = service();
        let result = service.create_habit(NewHabit::new("  ", Frequency::Daily)).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_habit_drops_days_for_other_frequencies() {
        let (service, _) = service();
        let mut new = NewHabit::new("Walk", Frequency::Daily);
        new.specific_days_of_week = "1,3".parse().unwrap();
        let habit = service.create_habit(new).await.unwrap();
        assert!(habit.specific_days_of_week.is_empty());
    }

    #[tokio::test]
    async fn test_second_log_on_same_day_overwrites_first() {
        let (service, storage) = service();
        let habit = service
            .create_habit(NewHabit::new("Read", Frequency::Daily))
            .await
            .unwrap();
        let day = date(2024, 1, 5);

        let partial = EntryFields {
            completed: false,
            value: Some(3.0),
            notes: Some("tired".into()),
        };
        let first = service.record_entry(habit.id, day, partial).await.unwrap();
        let full = EntryFields {
            completed: true,
            value: Some(10.0),
            notes: None,
        };
        let second = service.record_entry(habit.id, day, full).await.unwrap();

        assert_eq!(first.id, second.id);
        let entries = storage
            .lock()
            .await
            .list_entries(&EntryFilter::for_habit_between(habit.id, day, day))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].completed);
        assert_eq!(entries[0].value, Some(10.0));
        assert_eq!(entries[0].notes, None);
    }

    #[tokio::test]
    async fn test_record_entry_for_unknown_habit() {
        let (service, storage) = service();
        let result = service
            .record_entry(HabitId::new(), date(2024, 1, 1), EntryFields::done())
            .await;
        assert!(matches!(result, Err(Error::NotFound { kind: "habit", .. })));
        assert!(!storage.lock().await.has_pending());
    }

    #[tokio::test]
    async fn test_update_habit_not_found() {
        let (service, _) = service();
        let result = service.update_habit(HabitId::new(), HabitPatch::default()).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_habit_cascades_but_keeps_goals() {
        let (service, storage) = service();
        let habit = service
            .create_habit(NewHabit::new("Run", Frequency::Daily))
            .await
            .unwrap();
        service.record_entry(habit.id, date(2024, 1, 1), EntryFields::done()).await.unwrap();
        service
            .create_habit_goal(
                habit.id,
                NewHabitGoal {
                    target_value: Some(100.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let goal = Goal {
            id: GoalId::new(),
            name: "Get fit".to_string(),
            description: String::new(),
            target_date: None,
            status: GoalStatus::InProgress,
            parent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        {
            let mut s = storage.lock().await;
            s.save_goal(&goal).await.unwrap();
            s.link(Association::GoalHabit, goal.id.as_ulid(), habit.id.as_ulid()).await.unwrap();
            s.commit("seed").await.unwrap();
        }
        assert_eq!(service.supporting_goals(habit.id).await.unwrap(), vec![goal.id]);

        assert!(service.delete_habit(habit.id).await.unwrap());
        assert!(!service.delete_habit(habit.id).await.unwrap());

        let s = storage.lock().await;
        assert!(s.load_goal(goal.id).await.unwrap().is_some());
        assert!(s.list_entries(&EntryFilter::default()).await.unwrap().is_empty());
        assert!(s.list_habit_goals(habit.id).await.unwrap().is_empty());
        assert!(s
            .linked(Association::GoalHabit, LinkEnd::Left(goal.id.as_ulid()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_day_status_through_service() {
        let (service, _) = service();
        let mut new = NewHabit::new("Pages", Frequency::Daily);
        new.completion_type = CompletionType::Quantitative;
        new.target_value = Some(20.0);
        let habit = service.create_habit(new).await.unwrap();
        let today = Utc::now().date_naive();

        assert_eq!(service.day_status(habit.id, today).await.unwrap(), HabitDayStatus::Pending);
        let partial = EntryFields {
            completed: false,
            value: Some(5.0),
            notes: None,
        };
        service.record_entry(habit.id, today, partial).await.unwrap();
        assert_eq!(service.day_status(habit.id, today).await.unwrap(), HabitDayStatus::InProgress);
    }

    #[tokio::test]
    async fn test_habit_goal_progress_completes_at_target() {
        let (service, _) = service();
        let habit = service
            .create_habit(NewHabit::new("Run", Frequency::Daily))
            .await
            .unwrap();
        let goal = service
            .create_habit_goal(
                habit.id,
                NewHabitGoal {
                    target_value: Some(100.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let goal = service.update_habit_goal_progress(goal.id, 60.0).await.unwrap();
        assert!(!goal.completed);
        let goal = service.update_habit_goal_progress(goal.id, 100.0).await.unwrap();
        assert!(goal.completed);
        let goal = service.set_habit_goal_completion(goal.id, false).await.unwrap();
        assert!(!goal.completed);
        assert_eq!(service.habit_goals(habit.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_entries_on_date_pairs_habits() {
        let (service, _) = service();
        let a = service.create_habit(NewHabit::new("B-habit", Frequency::Daily)).await.unwrap();
        let b = service.create_habit(NewHabit::new("A-habit", Frequency::Daily)).await.unwrap();
        let day = date(2024, 2, 1);
        service.record_entry(a.id, day, EntryFields::done()).await.unwrap();
        service.record_entry(b.id, day, EntryFields::done()).await.unwrap();
        service.record_entry(b.id, date(2024, 2, 2), EntryFields::done()).await.unwrap();

        let pairs = service.entries_on_date(day).await.unwrap();
        let names: Vec<_> = pairs.iter().map(|(h, _)| h.name.as_str()).collect();
        assert_eq!(names, vec!["A-habit", "B-habit"]);
    }

    #[tokio::test]
    async fn test_failed_log_leaves_entries_in_memory_and_on_disk() {
        for fault in [Fault::SaveEntry, Fault::Commit] {
            let dir = tempfile::tempdir().unwrap();
            let inner = JsonStorage::new(dir.path()).await.unwrap();
            let storage = Arc::new(Mutex::new(FaultyStorage::new(inner)));
            let service = HabitService::new(storage.clone());
            let habit = service
                .create_habit(NewHabit::new("Stretch", Frequency::Daily))
                .await
                .unwrap();
            let logged = service
                .record_entry(habit.id, date(2024, 2, 1), EntryFields::done())
                .await
                .unwrap();

            storage.lock().await.fail_on(fault);
            let overwrite = EntryFields {
                completed: false,
                notes: Some("skipped".to_string()),
                ..Default::default()
            };
            let result = service.record_entry(habit.id, date(2024, 2, 1), overwrite).await;
            assert!(matches!(result, Err(Error::Persistence(_))), "{:?}", fault);
            let result = service
                .record_entry(habit.id, date(2024, 2, 2), EntryFields::done())
                .await;
            assert!(result.is_err(), "{:?}", fault);

            let kept = service.entry_on_date(habit.id, date(2024, 2, 1)).await.unwrap();
            assert_eq!(kept, Some(logged.clone()), "in memory after {:?}", fault);
            assert!(service.entry_on_date(habit.id, date(2024, 2, 2)).await.unwrap().is_none());

            let reopened = JsonStorage::new(dir.path()).await.unwrap();
            let on_disk = reopened.list_entries(&EntryFilter::default()).await.unwrap();
            assert_eq!(on_disk, vec![logged], "on disk after {:?}", fault);
        }
    }
}

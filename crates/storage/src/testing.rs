//! Failure injection for exercising rollback paths.
//!
//! [`FaultyStorage`] forwards every call to a real backend until the armed
//! operation is reached, which then fails without touching the inner store.

use crate::trait_::{Result, Storage, StorageError};
use async_trait::async_trait;
use lifeline_core::{
    Association, CheckInFilter, CheckInId, DatedNote, EntryFilter, EntryId, Goal, GoalCheckIn,
    GoalFilter, GoalId, Habit, HabitEntry, HabitFilter, HabitGoal, HabitGoalId, HabitId, LinkEnd,
    NoteFilter, NoteId, Value, ValueId,
};
use ulid::Ulid;

/// Operation that fails once armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `delete_goals`
    DeleteGoals,
    /// `delete_check_ins_for_goals`
    DeleteCheckIns,
    /// `save_entry`
    SaveEntry,
    /// `clear_links`
    ClearLinks,
    /// `commit`
    Commit,
}

/// Storage wrapper that fails a chosen operation.
pub struct FaultyStorage<S> {
    inner: S,
    fault: Option<Fault>,
}

impl<S: Storage> FaultyStorage<S> {
    /// Wrap `inner` with nothing armed.
    pub fn new(inner: S) -> Self {
        Self { inner, fault: None }
    }

    /// Make every later call of `fault` fail.
    pub fn fail_on(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    /// Disarm.
    pub fn heal(&mut self) {
        self.fault = None;
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwrap the backend.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn trip(&self, fault: Fault) -> Result<()> {
        if self.fault == Some(fault) {
            return Err(StorageError::Other(format!("injected failure in {:?}", fault)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Storage> Storage for FaultyStorage<S> {
    async fn save_goal(&mut self, goal: &Goal) -> Result<()> {
        self.inner.save_goal(goal).await
    }

    async fn load_goal(&self, id: GoalId) -> Result<Option<Goal>> {
        self.inner.load_goal(id).await
    }

    async fn list_goals(&self, filter: &GoalFilter) -> Result<Vec<Goal>> {
        self.inner.list_goals(filter).await
    }

    async fn delete_goals(&mut self, ids: &[GoalId]) -> Result<usize> {
        self.trip(Fault::DeleteGoals)?;
        self.inner.delete_goals(ids).await
    }

    async fn save_check_in(&mut self, check_in: &GoalCheckIn) -> Result<()> {
        self.inner.save_check_in(check_in).await
    }

    async fn load_check_in(&self, id: CheckInId) -> Result<Option<GoalCheckIn>> {
        self.inner.load_check_in(id).await
    }

    async fn list_check_ins(&self, filter: &CheckInFilter) -> Result<Vec<GoalCheckIn>> {
        self.inner.list_check_ins(filter).await
    }

    async fn delete_check_ins_for_goals(
        &mut self,
        goal_ids: &[GoalId],
    ) -> Result<Vec<CheckInId>> {
        self.trip(Fault::DeleteCheckIns)?;
        self.inner.delete_check_ins_for_goals(goal_ids).await
    }

    async fn save_habit(&mut self, habit: &Habit) -> Result<()> {
        self.inner.save_habit(habit).await
    }

    async fn load_habit(&self, id: HabitId) -> Result<Option<Habit>> {
        self.inner.load_habit(id).await
    }

    async fn list_habits(&self, filter: &HabitFilter) -> Result<Vec<Habit>> {
        self.inner.list_habits(filter).await
    }

    async fn delete_habit(&mut self, id: HabitId) -> Result<bool> {
        self.inner.delete_habit(id).await
    }

    async fn save_entry(&mut self, entry: &HabitEntry) -> Result<()> {
        self.trip(Fault::SaveEntry)?;
        self.inner.save_entry(entry).await
    }

    async fn load_entry(&self, id: EntryId) -> Result<Option<HabitEntry>> {
        self.inner.load_entry(id).await
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<HabitEntry>> {
        self.inner.list_entries(filter).await
    }

    async fn delete_entries_for_habit(&mut self, habit_id: HabitId) -> Result<usize> {
        self.inner.delete_entries_for_habit(habit_id).await
    }

    async fn save_habit_goal(&mut self, goal: &HabitGoal) -> Result<()> {
        self.inner.save_habit_goal(goal).await
    }

    async fn load_habit_goal(&self, id: HabitGoalId) -> Result<Option<HabitGoal>> {
        self.inner.load_habit_goal(id).await
    }

    async fn list_habit_goals(&self, habit_id: HabitId) -> Result<Vec<HabitGoal>> {
        self.inner.list_habit_goals(habit_id).await
    }

    async fn delete_habit_goals_for_habit(&mut self, habit_id: HabitId) -> Result<usize> {
        self.inner.delete_habit_goals_for_habit(habit_id).await
    }

    async fn save_value(&mut self, value: &Value) -> Result<()> {
        self.inner.save_value(value).await
    }

    async fn load_value(&self, id: ValueId) -> Result<Option<Value>> {
        self.inner.load_value(id).await
    }

    async fn list_values(&self) -> Result<Vec<Value>> {
        self.inner.list_values().await
    }

    async fn delete_value(&mut self, id: ValueId) -> Result<bool> {
        self.inner.delete_value(id).await
    }

    async fn save_note(&mut self, note: &DatedNote) -> Result<()> {
        self.inner.save_note(note).await
    }

    async fn load_note(&self, id: NoteId) -> Result<Option<DatedNote>> {
        self.inner.load_note(id).await
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<DatedNote>> {
        self.inner.list_notes(filter).await
    }

    async fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        self.inner.delete_note(id).await
    }

    async fn link(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<()> {
        self.inner.link(association, left, right).await
    }

    async fn unlink(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<bool> {
        self.inner.unlink(association, left, right).await
    }

    async fn clear_links(&mut self, association: Association, end: LinkEnd) -> Result<usize> {
        self.trip(Fault::ClearLinks)?;
        self.inner.clear_links(association, end).await
    }

    async fn linked(&self, association: Association, end: LinkEnd) -> Result<Vec<Ulid>> {
        self.inner.linked(association, end).await
    }

    async fn begin(&mut self) -> Result<()> {
        self.inner.begin().await
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        self.trip(Fault::Commit)?;
        self.inner.commit(message).await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await
    }
}

//! Storage trait abstraction.

use async_trait::async_trait;
use lifeline_core::{
    Association, CheckInFilter, CheckInId, DatedNote, EntryFilter, EntryId, Goal, GoalCheckIn,
    GoalFilter, GoalId, Habit, HabitEntry, HabitFilter, HabitGoal, HabitGoalId, HabitId, LinkEnd,
    NoteFilter, NoteId, Value, ValueId,
};
use tracing::warn;
use ulid::Ulid;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unit-of-work misuse or failure
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<StorageError> for lifeline_core::Error {
    fn from(err: StorageError) -> Self {
        lifeline_core::Error::Persistence(err.to_string())
    }
}

/// Storage abstraction for lifeline data.
///
/// This trait allows different storage backends to be plugged in. `save_*`
/// upserts by id; `list_*` delegates matching, ordering and limiting to the
/// filter types of `lifeline-core`.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Goal operations ===

    /// Save a goal (create or update).
    async fn save_goal(&mut self, goal: &Goal) -> Result<()>;

    /// Load a goal by ID.
    async fn load_goal(&self, id: GoalId) -> Result<Option<Goal>>;

    /// List goals matching the filter.
    async fn list_goals(&self, filter: &GoalFilter) -> Result<Vec<Goal>>;

    /// Delete goals, returning how many existed.
    async fn delete_goals(&mut self, ids: &[GoalId]) -> Result<usize>;

    // === Check-in operations ===

    /// Save a check-in (create or update).
    async fn save_check_in(&mut self, check_in: &GoalCheckIn) -> Result<()>;

    /// Load a check-in by ID.
    async fn load_check_in(&self, id: CheckInId) -> Result<Option<GoalCheckIn>>;

    /// List check-ins matching the filter.
    async fn list_check_ins(&self, filter: &CheckInFilter) -> Result<Vec<GoalCheckIn>>;

    /// Delete every check-in owned by one of `goal_ids`, returning their ids.
    async fn delete_check_ins_for_goals(
        &mut self,
        goal_ids: &[GoalId],
    ) -> Result<Vec<CheckInId>>;

    // === Habit operations ===

    /// Save a habit (create or update).
    async fn save_habit(&mut self, habit: &Habit) -> Result<()>;

    /// Load a habit by ID.
    async fn load_habit(&self, id: HabitId) -> Result<Option<Habit>>;

    /// List habits matching the filter.
    async fn list_habits(&self, filter: &HabitFilter) -> Result<Vec<Habit>>;

    /// Delete a habit row. Owned rows are removed by the caller.
    async fn delete_habit(&mut self, id: HabitId) -> Result<bool>;

    // === Habit entry operations ===

    /// Save an entry (create or update).
    async fn save_entry(&mut self, entry: &HabitEntry) -> Result<()>;

    /// Load an entry by ID.
    async fn load_entry(&self, id: EntryId) -> Result<Option<HabitEntry>>;

    /// List entries matching the filter.
    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<HabitEntry>>;

    /// Delete all entries of a habit, returning how many were removed.
    async fn delete_entries_for_habit(&mut self, habit_id: HabitId) -> Result<usize>;

    // === Habit goal operations ===

    /// Save a habit goal (create or update).
    async fn save_habit_goal(&mut self, goal: &HabitGoal) -> Result<()>;

    /// Load a habit goal by ID.
    async fn load_habit_goal(&self, id: HabitGoalId) -> Result<Option<HabitGoal>>;

    /// List the habit goals of a habit, oldest first.
    async fn list_habit_goals(&self, habit_id: HabitId) -> Result<Vec<HabitGoal>>;

    /// Delete all habit goals of a habit, returning how many were removed.
    async fn delete_habit_goals_for_habit(&mut self, habit_id: HabitId) -> Result<usize>;

    // === Value operations ===

    /// Save a value (create or update).
    async fn save_value(&mut self, value: &Value) -> Result<()>;

    /// Load a value by ID.
    async fn load_value(&self, id: ValueId) -> Result<Option<Value>>;

    /// List all values ordered by name.
    async fn list_values(&self) -> Result<Vec<Value>>;

    /// Delete a value row.
    async fn delete_value(&mut self, id: ValueId) -> Result<bool>;

    // === Note operations ===

    /// Save a dated note (create or update).
    async fn save_note(&mut self, note: &DatedNote) -> Result<()>;

    /// Load a note by ID.
    async fn load_note(&self, id: NoteId) -> Result<Option<DatedNote>>;

    /// List notes matching the filter.
    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<DatedNote>>;

    /// Delete a note row.
    async fn delete_note(&mut self, id: NoteId) -> Result<bool>;

    // === Association operations ===

    /// Link two entities. Linking an existing pair is a no-op.
    async fn link(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<()>;

    /// Remove one link, returning whether it existed.
    async fn unlink(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<bool>;

    /// Remove every link of `association` with `end` fixed.
    async fn clear_links(&mut self, association: Association, end: LinkEnd) -> Result<usize>;

    /// Ids on the opposite side of `end`, in ascending order.
    async fn linked(&self, association: Association, end: LinkEnd) -> Result<Vec<Ulid>>;

    // === Transaction support ===

    /// Open a unit of work. Writes made until `commit` or `rollback` become
    /// visible to other readers together or not at all.
    async fn begin(&mut self) -> Result<()>;

    /// Commit pending changes with a message.
    async fn commit(&mut self, message: &str) -> Result<()>;

    /// Rollback pending changes.
    async fn rollback(&mut self) -> Result<()>;
}

/// Close the unit of work opened by [`Storage::begin`]: commit when `outcome`
/// is `Ok`, roll back when it is `Err`. A failed commit is rolled back too and
/// surfaced as the operation's error.
pub async fn settle<S, T, E>(
    storage: &mut S,
    outcome: std::result::Result<T, E>,
    message: &str,
) -> std::result::Result<T, E>
where
    S: Storage + ?Sized,
    E: From<StorageError>,
{
    match outcome {
        Ok(value) => match storage.commit(message).await {
            Ok(()) => Ok(value),
            Err(err) => {
                if let Err(rollback_err) = storage.rollback().await {
                    warn!("rollback after failed commit '{}' failed: {}", message, rollback_err);
                }
                Err(err.into())
            }
        },
        Err(err) => {
            if let Err(rollback_err) = storage.rollback().await {
                warn!("rollback of '{}' failed: {}", message, rollback_err);
            }
            Err(err)
        }
    }
}

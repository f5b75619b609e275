//! SQLite storage backend for lifeline.
//!
//! Records are kept as JSON documents in a single `entities` table keyed by
//! `(entity_type, id)`; associations live in a `links` table. A unit of work
//! opened with `begin` maps onto an sqlx transaction, and every statement
//! issued while it is open runs inside it.

use async_trait::async_trait;
use lifeline_core::{
    Association, CheckInFilter, CheckInId, DatedNote, EntryFilter, EntryId, Goal, GoalCheckIn,
    GoalFilter, GoalId, Habit, HabitEntry, HabitFilter, HabitGoal, HabitGoalId, HabitId, LinkEnd,
    NoteFilter, NoteId, Value, ValueId,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use ulid::Ulid;

use super::trait_::{Result, Storage, StorageError};

type Query<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

const GOAL: &str = "goal";
const CHECK_IN: &str = "check_in";
const HABIT: &str = "habit";
const ENTRY: &str = "habit_entry";
const HABIT_GOAL: &str = "habit_goal";
const VALUE: &str = "value";
const NOTE: &str = "note";

/// SQLite storage implementation.
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
    /// Open unit of work, if any
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance from a connection URL.
    pub async fn new(db_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(db_url).await?;

        let storage = Self {
            pool,
            tx: Mutex::new(None),
        };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Create a new SQLite storage instance from a path, creating the file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| StorageError::Other(format!("non UTF-8 path: {}", path.display())))?;
        Self::new(&format!("sqlite://{}?mode=rwc", path)).await
    }

    /// Create an in-memory SQLite storage for testing.
    ///
    /// The pool is capped at one connection: every connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self {
            pool,
            tx: Mutex::new(None),
        };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                entity_type TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (entity_type, id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS links (
                association TEXT NOT NULL,
                left_id TEXT NOT NULL,
                right_id TEXT NOT NULL,
                PRIMARY KEY (association, left_id, right_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_right ON links(association, right_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Run a statement inside the open transaction, or on the pool.
    async fn execute(&self, query: Query<'_>) -> Result<u64> {
        let mut tx = self.tx.lock().await;
        let done = match tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(done.rows_affected())
    }

    /// Fetch rows inside the open transaction, or from the pool.
    async fn fetch_all(&self, query: Query<'_>) -> Result<Vec<SqliteRow>> {
        let mut tx = self.tx.lock().await;
        let rows = match tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        Ok(rows)
    }

    async fn put<T: Serialize>(&self, entity_type: &str, id: String, record: &T) -> Result<()> {
        let data = serde_json::to_string(record)?;
        self.execute(
            sqlx::query(
                "INSERT OR REPLACE INTO entities (entity_type, id, data, updated_at)
                VALUES (?, ?, ?, ?)",
            )
            .bind(entity_type.to_string())
            .bind(id)
            .bind(data)
            .bind(chrono::Utc::now().to_rfc3339()),
        )
        .await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, entity_type: &str, id: String) -> Result<Option<T>> {
        let rows = self
            .fetch_all(
                sqlx::query("SELECT data FROM entities WHERE entity_type = ? AND id = ?")
                    .bind(entity_type.to_string())
                    .bind(id),
            )
            .await?;
        rows.first().map(decode).transpose()
    }

    async fn all<T: DeserializeOwned>(&self, entity_type: &str) -> Result<Vec<T>> {
        let rows = self
            .fetch_all(
                sqlx::query("SELECT data FROM entities WHERE entity_type = ?")
                    .bind(entity_type.to_string()),
            )
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn remove(&self, entity_type: &str, id: String) -> Result<bool> {
        let affected = self
            .execute(
                sqlx::query("DELETE FROM entities WHERE entity_type = ? AND id = ?")
                    .bind(entity_type.to_string())
                    .bind(id),
            )
            .await?;
        Ok(affected > 0)
    }
}

fn decode<T: DeserializeOwned>(row: &SqliteRow) -> Result<T> {
    let data: String = row.try_get("data")?;
    Ok(serde_json::from_str(&data)?)
}

#[async_trait]
impl Storage for SqliteStorage {
    // === Goal operations ===

    async fn save_goal(&mut self, goal: &Goal) -> Result<()> {
        self.put(GOAL, goal.id.to_string(), goal).await
    }

    async fn load_goal(&self, id: GoalId) -> Result<Option<Goal>> {
        self.get(GOAL, id.to_string()).await
    }

    async fn list_goals(&self, filter: &GoalFilter) -> Result<Vec<Goal>> {
        Ok(filter.select(self.all::<Goal>(GOAL).await?))
    }

    async fn delete_goals(&mut self, ids: &[GoalId]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            if self.remove(GOAL, id.to_string()).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // === Check-in operations ===

    async fn save_check_in(&mut self, check_in: &GoalCheckIn) -> Result<()> {
        self.put(CHECK_IN, check_in.id.to_string(), check_in).await
    }

    async fn load_check_in(&self, id: CheckInId) -> Result<Option<GoalCheckIn>> {
        self.get(CHECK_IN, id.to_string()).await
    }

    async fn list_check_ins(&self, filter: &CheckInFilter) -> Result<Vec<GoalCheckIn>> {
        Ok(filter.select(self.all::<GoalCheckIn>(CHECK_IN).await?))
    }

    async fn delete_check_ins_for_goals(
        &mut self,
        goal_ids: &[GoalId],
    ) -> Result<Vec<CheckInId>> {
        let doomed: Vec<CheckInId> = self
            .all::<GoalCheckIn>(CHECK_IN)
            .await?
            .into_iter()
            .filter(|c| goal_ids.contains(&c.goal_id))
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            self.remove(CHECK_IN, id.to_string()).await?;
        }
        Ok(doomed)
    }

    // === Habit operations ===

    async fn save_habit(&mut self, habit: &Habit) -> Result<()> {
        self.put(HABIT, habit.id.to_string(), habit).await
    }

    async fn load_habit(&self, id: HabitId) -> Result<Option<Habit>> {
        self.get(HABIT, id.to_string()).await
    }

    async fn list_habits(&self, filter: &HabitFilter) -> Result<Vec<Habit>> {
        Ok(filter.select(self.all::<Habit>(HABIT).await?))
    }

    async fn delete_habit(&mut self, id: HabitId) -> Result<bool> {
        self.remove(HABIT, id.to_string()).await
    }

    // === Habit entry operations ===

    async fn save_entry(&mut self, entry: &HabitEntry) -> Result<()> {
        self.put(ENTRY, entry.id.to_string(), entry).await
    }

    async fn load_entry(&self, id: EntryId) -> Result<Option<HabitEntry>> {
        self.get(ENTRY, id.to_string()).await
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<HabitEntry>> {
        Ok(filter.select(self.all::<HabitEntry>(ENTRY).await?))
    }

    async fn delete_entries_for_habit(&mut self, habit_id: HabitId) -> Result<usize> {
        let doomed: Vec<EntryId> = self
            .all::<HabitEntry>(ENTRY)
            .await?
            .into_iter()
            .filter(|e| e.habit_id == habit_id)
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            self.remove(ENTRY, id.to_string()).await?;
        }
        Ok(doomed.len())
    }

    // === Habit goal operations ===

    async fn save_habit_goal(&mut self, goal: &HabitGoal) -> Result<()> {
        self.put(HABIT_GOAL, goal.id.to_string(), goal).await
    }

    async fn load_habit_goal(&self, id: HabitGoalId) -> Result<Option<HabitGoal>> {
        self.get(HABIT_GOAL, id.to_string()).await
    }

    async fn list_habit_goals(&self, habit_id: HabitId) -> Result<Vec<HabitGoal>> {
        let mut goals: Vec<HabitGoal> = self
            .all::<HabitGoal>(HABIT_GOAL)
            .await?
            .into_iter()
            .filter(|g| g.habit_id == habit_id)
            .collect();
        goals.sort_by_key(|g| (g.created_at, g.id));
        Ok(goals)
    }

    async fn delete_habit_goals_for_habit(&mut self, habit_id: HabitId) -> Result<usize> {
        let doomed: Vec<HabitGoalId> = self
            .list_habit_goals(habit_id)
            .await?
            .into_iter()
            .map(|g| g.id)
            .collect();
        for id in &doomed {
            self.remove(HABIT_GOAL, id.to_string()).await?;
        }
        Ok(doomed.len())
    }

    // === Value operations ===

    async fn save_value(&mut self, value: &Value) -> Result<()> {
        self.put(VALUE, value.id.to_string(), value).await
    }

    async fn load_value(&self, id: ValueId) -> Result<Option<Value>> {
        self.get(VALUE, id.to_string()).await
    }

    async fn list_values(&self) -> Result<Vec<Value>> {
        let mut values = self.all::<Value>(VALUE).await?;
        values.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(values)
    }

    async fn delete_value(&mut self, id: ValueId) -> Result<bool> {
        self.remove(VALUE, id.to_string()).await
    }

    // === Note operations ===

    async fn save_note(&mut self, note: &DatedNote) -> Result<()> {
        self.put(NOTE, note.id.to_string(), note).await
    }

    async fn load_note(&self, id: NoteId) -> Result<Option<DatedNote>> {
        self.get(NOTE, id.to_string()).await
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<DatedNote>> {
        Ok(filter.select(self.all::<DatedNote>(NOTE).await?))
    }

    async fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        self.remove(NOTE, id.to_string()).await
    }

    // === Association operations ===

    async fn link(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<()> {
        self.execute(
            sqlx::query(
                "INSERT OR IGNORE INTO links (association, left_id, right_id) VALUES (?, ?, ?)",
            )
            .bind(association.as_str())
            .bind(left.to_string())
            .bind(right.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn unlink(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<bool> {
        let affected = self
            .execute(
                sqlx::query(
                    "DELETE FROM links WHERE association = ? AND left_id = ? AND right_id = ?",
                )
                .bind(association.as_str())
                .bind(left.to_string())
                .bind(right.to_string()),
            )
            .await?;
        Ok(affected > 0)
    }

    async fn clear_links(&mut self, association: Association, end: LinkEnd) -> Result<usize> {
        let query = match end {
            LinkEnd::Left(id) => {
                sqlx::query("DELETE FROM links WHERE association = ? AND left_id = ?")
                    .bind(association.as_str())
                    .bind(id.to_string())
            }
            LinkEnd::Right(id) => {
                sqlx::query("DELETE FROM links WHERE association = ? AND right_id = ?")
                    .bind(association.as_str())
                    .bind(id.to_string())
            }
        };
        Ok(self.execute(query).await? as usize)
    }

    async fn linked(&self, association: Association, end: LinkEnd) -> Result<Vec<Ulid>> {
        let (query, column) = match end {
            LinkEnd::Left(id) => (
                sqlx::query("SELECT right_id FROM links WHERE association = ? AND left_id = ?")
                    .bind(association.as_str())
                    .bind(id.to_string()),
                "right_id",
            ),
            LinkEnd::Right(id) => (
                sqlx::query("SELECT left_id FROM links WHERE association = ? AND right_id = ?")
                    .bind(association.as_str())
                    .bind(id.to_string()),
                "left_id",
            ),
        };
        let mut ids = Vec::new();
        for row in self.fetch_all(query).await? {
            let raw: String = row.try_get(column)?;
            let id = raw
                .parse::<Ulid>()
                .map_err(|e| StorageError::Other(format!("corrupt link id '{}': {}", raw, e)))?;
            ids.push(id);
        }
        ids.sort();
        Ok(ids)
    }

    // === Transaction support ===

    async fn begin(&mut self) -> Result<()> {
        let mut tx = self.tx.lock().await;
        if let Some(stale) = tx.take() {
            warn!("Discarding unfinished unit of work");
            stale.rollback().await?;
        }
        *tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit().await?;
            debug!("Committed: {}", message);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

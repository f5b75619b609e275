//! JSON file storage implementation.
//!
//! Stores one JSON file per record under `<root>/<table>/<id>.json` and the
//! association rows in `<root>/links.json`. Every table is loaded into memory
//! on open. Writes land in a working copy; `rollback` restores the last
//! committed copy.
//!
//! `commit` first writes the complete set of file changes to
//! `<root>/journal.json` and only then applies them. Once the journal is in
//! place the commit is durable: a failure while applying it leaves the
//! journal behind and the next commit or open replays it, so the record files
//! never stay half-updated.

use super::{Result, Storage, StorageError};
use lifeline_core::{
    Association, CheckInFilter, CheckInId, DatedNote, EntryFilter, EntryId, Goal, GoalCheckIn,
    GoalFilter, GoalId, Habit, HabitEntry, HabitFilter, HabitGoal, HabitGoalId, HabitId, Link,
    LinkEnd, NoteFilter, NoteId, Value, ValueId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use ulid::Ulid;

const GOALS: &str = "goals";
const CHECK_INS: &str = "check_ins";
const HABITS: &str = "habits";
const ENTRIES: &str = "habit_entries";
const HABIT_GOALS: &str = "habit_goals";
const VALUES: &str = "values";
const NOTES: &str = "notes";
const LINKS_FILE: &str = "links.json";
const JOURNAL_FILE: &str = "journal.json";

#[derive(Debug, Clone, Default, PartialEq)]
struct Tables {
    goals: BTreeMap<GoalId, Goal>,
    check_ins: BTreeMap<CheckInId, GoalCheckIn>,
    habits: BTreeMap<HabitId, Habit>,
    entries: BTreeMap<EntryId, HabitEntry>,
    habit_goals: BTreeMap<HabitGoalId, HabitGoal>,
    values: BTreeMap<ValueId, Value>,
    notes: BTreeMap<NoteId, DatedNote>,
    links: BTreeSet<Link>,
}

/// File changes of one commit. Paths are relative to the storage root.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Journal {
    writes: Vec<(PathBuf, String)>,
    removals: Vec<PathBuf>,
}

impl Journal {
    fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.removals.is_empty()
    }

    /// Bring the record files in line with the journal. Repeating it is harmless.
    async fn apply(&self, root: &Path) -> Result<()> {
        for (path, json) in &self.writes {
            let target = root.join(path);
            let staging = staging_path(&target);
            fs::write(&staging, json.as_bytes()).await?;
            fs::rename(&staging, &target).await?;
        }
        for path in &self.removals {
            remove_if_exists(&root.join(path)).await?;
        }
        Ok(())
    }
}

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: Option<PathBuf>,
    committed: Tables,
    working: Tables,
    in_transaction: bool,
}

impl JsonStorage {
    /// Open (or create) storage rooted at `root`, loading every table.
    ///
    /// A commit journal left behind by an interrupted commit is replayed
    /// first; opening fails if it still cannot be applied.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for table in [GOALS, CHECK_INS, HABITS, ENTRIES, HABIT_GOALS, VALUES, NOTES] {
            fs::create_dir_all(root.join(table)).await?;
        }
        remove_if_exists(&staging_path(&root.join(JOURNAL_FILE))).await?;
        replay_journal(&root).await?;

        let mut tables = Tables::default();
        for goal in list_dir::<Goal>(&root.join(GOALS)).await? {
            tables.goals.insert(goal.id, goal);
        }
        for check_in in list_dir::<GoalCheckIn>(&root.join(CHECK_INS)).await? {
            tables.check_ins.insert(check_in.id, check_in);
        }
        for habit in list_dir::<Habit>(&root.join(HABITS)).await? {
            tables.habits.insert(habit.id, habit);
        }
        for entry in list_dir::<HabitEntry>(&root.join(ENTRIES)).await? {
            tables.entries.insert(entry.id, entry);
        }
        for goal in list_dir::<HabitGoal>(&root.join(HABIT_GOALS)).await? {
            tables.habit_goals.insert(goal.id, goal);
        }
        for value in list_dir::<Value>(&root.join(VALUES)).await? {
            tables.values.insert(value.id, value);
        }
        for note in list_dir::<DatedNote>(&root.join(NOTES)).await? {
            tables.notes.insert(note.id, note);
        }
        if let Some(links) = read_json::<Vec<Link>>(&root.join(LINKS_FILE)).await? {
            tables.links = links.into_iter().collect();
        }

        debug!(
            "Opened JSON storage at {} ({} goals, {} habits)",
            root.display(),
            tables.goals.len(),
            tables.habits.len()
        );

        Ok(Self {
            root: Some(root),
            committed: tables.clone(),
            working: tables,
            in_transaction: false,
        })
    }

    /// Storage that never touches disk. Commit and rollback behave as usual.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            committed: Tables::default(),
            working: Tables::default(),
            in_transaction: false,
        }
    }

    /// Whether there are writes not yet committed.
    pub fn has_pending(&self) -> bool {
        self.working != self.committed
    }

    /// File changes turning the committed copy into the working copy.
    fn journal(&self) -> Result<Journal> {
        let old = &self.committed;
        let new = &self.working;
        let mut journal = Journal::default();

        diff_table(&old.goals, &new.goals, GOALS, &mut journal)?;
        diff_table(&old.check_ins, &new.check_ins, CHECK_INS, &mut journal)?;
        diff_table(&old.habits, &new.habits, HABITS, &mut journal)?;
        diff_table(&old.entries, &new.entries, ENTRIES, &mut journal)?;
        diff_table(&old.habit_goals, &new.habit_goals, HABIT_GOALS, &mut journal)?;
        diff_table(&old.values, &new.values, VALUES, &mut journal)?;
        diff_table(&old.notes, &new.notes, NOTES, &mut journal)?;
        if old.links != new.links {
            let links: Vec<&Link> = new.links.iter().collect();
            journal
                .writes
                .push((PathBuf::from(LINKS_FILE), serde_json::to_string_pretty(&links)?));
        }
        Ok(journal)
    }

    /// Write the working copy to disk through the commit journal.
    ///
    /// Returns an error only while nothing of this commit has reached disk.
    async fn flush(&self, root: &Path) -> Result<()> {
        replay_journal(root).await?;

        let journal = self.journal()?;
        if journal.is_empty() {
            return Ok(());
        }

        let path = root.join(JOURNAL_FILE);
        let staging = staging_path(&path);
        fs::write(&staging, serde_json::to_vec_pretty(&journal)?).await?;
        fs::rename(&staging, &path).await?;

        // Durable from here on.
        if let Err(e) = journal.apply(root).await {
            warn!("Commit journaled but not applied, will replay later: {}", e);
            return Ok(());
        }
        if let Err(e) = fs::remove_file(&path).await {
            warn!("Could not remove applied journal {}: {}", path.display(), e);
        }

        debug!(
            "Flushed {} writes and {} removals",
            journal.writes.len(),
            journal.removals.len()
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_goal(&mut self, goal: &Goal) -> Result<()> {
        self.working.goals.insert(goal.id, goal.clone());
        Ok(())
    }

    async fn load_goal(&self, id: GoalId) -> Result<Option<Goal>> {
        Ok(self.working.goals.get(&id).cloned())
    }

    async fn list_goals(&self, filter: &GoalFilter) -> Result<Vec<Goal>> {
        Ok(filter.select(self.working.goals.values().cloned()))
    }

    async fn delete_goals(&mut self, ids: &[GoalId]) -> Result<usize> {
        Ok(ids
            .iter()
            .filter(|id| self.working.goals.remove(*id).is_some())
            .count())
    }

    async fn save_check_in(&mut self, check_in: &GoalCheckIn) -> Result<()> {
        self.working.check_ins.insert(check_in.id, check_in.clone());
        Ok(())
    }

    async fn load_check_in(&self, id: CheckInId) -> Result<Option<GoalCheckIn>> {
        Ok(self.working.check_ins.get(&id).cloned())
    }

    async fn list_check_ins(&self, filter: &CheckInFilter) -> Result<Vec<GoalCheckIn>> {
        Ok(filter.select(self.working.check_ins.values().cloned()))
    }

    async fn delete_check_ins_for_goals(
        &mut self,
        goal_ids: &[GoalId],
    ) -> Result<Vec<CheckInId>> {
        let doomed: Vec<CheckInId> = self
            .working
            .check_ins
            .values()
            .filter(|c| goal_ids.contains(&c.goal_id))
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            self.working.check_ins.remove(id);
        }
        Ok(doomed)
    }

    async fn save_habit(&mut self, habit: &Habit) -> Result<()> {
        self.working.habits.insert(habit.id, habit.clone());
        Ok(())
    }

    async fn load_habit(&self, id: HabitId) -> Result<Option<Habit>> {
        Ok(self.working.habits.get(&id).cloned())
    }

    async fn list_habits(&self, filter: &HabitFilter) -> Result<Vec<Habit>> {
        Ok(filter.select(self.working.habits.values().cloned()))
    }

    async fn delete_habit(&mut self, id: HabitId) -> Result<bool> {
        Ok(self.working.habits.remove(&id).is_some())
    }

    async fn save_entry(&mut self, entry: &HabitEntry) -> Result<()> {
        self.working.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn load_entry(&self, id: EntryId) -> Result<Option<HabitEntry>> {
        Ok(self.working.entries.get(&id).cloned())
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<HabitEntry>> {
        Ok(filter.select(self.working.entries.values().cloned()))
    }

    async fn delete_entries_for_habit(&mut self, habit_id: HabitId) -> Result<usize> {
        let before = self.working.entries.len();
        self.working.entries.retain(|_, e| e.habit_id != habit_id);
        Ok(before - self.working.entries.len())
    }

    async fn save_habit_goal(&mut self, goal: &HabitGoal) -> Result<()> {
        self.working.habit_goals.insert(goal.id, goal.clone());
        Ok(())
    }

    async fn load_habit_goal(&self, id: HabitGoalId) -> Result<Option<HabitGoal>> {
        Ok(self.working.habit_goals.get(&id).cloned())
    }

    async fn list_habit_goals(&self, habit_id: HabitId) -> Result<Vec<HabitGoal>> {
        let mut goals: Vec<HabitGoal> = self
            .working
            .habit_goals
            .values()
            .filter(|g| g.habit_id == habit_id)
            .cloned()
            .collect();
        goals.sort_by_key(|g| (g.created_at, g.id));
        Ok(goals)
    }

    async fn delete_habit_goals_for_habit(&mut self, habit_id: HabitId) -> Result<usize> {
        let before = self.working.habit_goals.len();
        self.working.habit_goals.retain(|_, g| g.habit_id != habit_id);
        Ok(before - self.working.habit_goals.len())
    }

    async fn save_value(&mut self, value: &Value) -> Result<()> {
        self.working.values.insert(value.id, value.clone());
        Ok(())
    }

    async fn load_value(&self, id: ValueId) -> Result<Option<Value>> {
        Ok(self.working.values.get(&id).cloned())
    }

    async fn list_values(&self) -> Result<Vec<Value>> {
        let mut values: Vec<Value> = self.working.values.values().cloned().collect();
        values.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(values)
    }

    async fn delete_value(&mut self, id: ValueId) -> Result<bool> {
        Ok(self.working.values.remove(&id).is_some())
    }

    async fn save_note(&mut self, note: &DatedNote) -> Result<()> {
        self.working.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn load_note(&self, id: NoteId) -> Result<Option<DatedNote>> {
        Ok(self.working.notes.get(&id).cloned())
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<DatedNote>> {
        Ok(filter.select(self.working.notes.values().cloned()))
    }

    async fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        Ok(self.working.notes.remove(&id).is_some())
    }

    async fn link(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<()> {
        self.working.links.insert(Link { association, left, right });
        Ok(())
    }

    async fn unlink(&mut self, association: Association, left: Ulid, right: Ulid) -> Result<bool> {
        Ok(self.working.links.remove(&Link { association, left, right }))
    }

    async fn clear_links(&mut self, association: Association, end: LinkEnd) -> Result<usize> {
        let before = self.working.links.len();
        self.working.links.retain(|l| !l.matches(association, end));
        Ok(before - self.working.links.len())
    }

    async fn linked(&self, association: Association, end: LinkEnd) -> Result<Vec<Ulid>> {
        let mut ids: Vec<Ulid> = self
            .working
            .links
            .iter()
            .filter(|l| l.matches(association, end))
            .map(|l| l.other(end))
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            warn!("Discarding unfinished unit of work");
            self.working = self.committed.clone();
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        if let Some(root) = &self.root {
            self.flush(root).await?;
        }
        self.committed = self.working.clone();
        self.in_transaction = false;
        debug!("Committed: {}", message);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.working = self.committed.clone();
        self.in_transaction = false;
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Apply and drop a journal left by an earlier commit, if any.
async fn replay_journal(root: &Path) -> Result<()> {
    let path = root.join(JOURNAL_FILE);
    let Some(journal) = read_json::<Journal>(&path).await? else {
        return Ok(());
    };

    info!(
        "Replaying unfinished commit ({} writes, {} removals)",
        journal.writes.len(),
        journal.removals.len()
    );
    journal.apply(root).await?;
    fs::remove_file(&path).await?;
    Ok(())
}

fn diff_table<K, V>(
    old: &BTreeMap<K, V>,
    new: &BTreeMap<K, V>,
    table: &str,
    journal: &mut Journal,
) -> Result<()>
where
    K: Ord + std::fmt::Display,
    V: PartialEq + Serialize,
{
    let dir = Path::new(table);
    for (id, record) in new {
        if old.get(id) != Some(record) {
            let json = serde_json::to_string_pretty(record)?;
            journal.writes.push((dir.join(format!("{}.json", id)), json));
        }
    }
    for id in old.keys().filter(|id| !new.contains_key(*id)) {
        journal.removals.push(dir.join(format!("{}.json", id)));
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(StorageError::Json(e)) => {
                return Err(StorageError::Other(format!(
                    "corrupt record {}: {}",
                    entry.path().display(),
                    e
                )))
            }
            Err(e) => return Err(e),
        }
    }
    Ok(items)
}

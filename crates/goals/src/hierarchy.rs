//! Goal hierarchy management.
//!
//! Goals form a tree through a nullable `parent_id`. The manager keeps that
//! tree consistent: parents must exist, re-parenting may never create a
//! cycle, and deleting a goal removes its whole subtree together with the
//! check-ins the subtree owns.

use chrono::Utc;
use lifeline_core::{
    require_name, validate_progress, Association, CheckInFilter, CheckInId, CheckInPatch, Error,
    Goal, GoalCheckIn, GoalFilter, GoalId, GoalNode, GoalOption, GoalPatch, GoalStatus, Habit,
    HabitId, LinkEnd, NewCheckIn, NewGoal, Result, Value, ValueId,
};
use lifeline_storage::{settle, Storage};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Goal hierarchy manager.
pub struct GoalHierarchyManager<S: Storage> {
    storage: Arc<Mutex<S>>,
}

impl<S: Storage> GoalHierarchyManager<S> {
    /// Create a new hierarchy manager over a shared store.
    pub fn new(storage: Arc<Mutex<S>>) -> Self {
        Self { storage }
    }

    /// Create a goal, optionally under a parent, with its value and habit links.
    pub async fn create_goal(&self, new: NewGoal) -> Result<Goal> {
        require_name("goal name", &new.name)?;

        let mut storage = self.storage.lock().await;
        if let Some(parent) = new.parent_id {
            if storage.load_goal(parent).await?.is_none() {
                return Err(Error::invalid_reference("parent goal", parent));
            }
        }
        ensure_values(&*storage, &new.value_ids).await?;
        ensure_habits(&*storage, &new.habit_ids).await?;

        let now = Utc::now();
        let goal = Goal {
            id: GoalId::new(),
            name: new.name,
            description: new.description,
            target_date: new.target_date,
            status: new.status,
            parent_id: new.parent_id,
            created_at: now,
            updated_at: now,
        };

        storage.begin().await?;
        let outcome = Self::write_goal(
            &mut *storage,
            &goal,
            Some(&new.value_ids),
            Some(&new.habit_ids),
        )
        .await;
        settle(&mut *storage, outcome, "create goal").await?;

        debug!("Created goal {} under {:?}", goal.id, goal.parent_id);
        Ok(goal)
    }

    /// Load a goal by ID.
    pub async fn get_goal(&self, id: GoalId) -> Result<Option<Goal>> {
        Ok(self.storage.lock().await.load_goal(id).await?)
    }

    /// List goals matching the filter.
    pub async fn list_goals(&self, filter: &GoalFilter) -> Result<Vec<Goal>> {
        Ok(self.storage.lock().await.list_goals(filter).await?)
    }

    /// Direct children of `parent`, ordered by name.
    pub async fn sub_goals(&self, parent: GoalId) -> Result<Vec<Goal>> {
        self.list_goals(&GoalFilter::children_of(parent)).await
    }

    /// Goals without a parent, ordered by name.
    pub async fn root_goals(&self) -> Result<Vec<Goal>> {
        self.list_goals(&GoalFilter {
            parent: Some(None),
            ..Default::default()
        })
        .await
    }

    /// Apply a partial update to a goal.
    ///
    /// A new parent must exist and must not be the goal itself or one of its
    /// descendants. Link sets given in the patch replace the current ones.
    pub async fn update_goal(&self, id: GoalId, patch: GoalPatch) -> Result<Goal> {
        let mut storage = self.storage.lock().await;
        let mut goal = storage
            .load_goal(id)
            .await?
            .ok_or_else(|| Error::not_found("goal", id))?;

        if let Some(Some(parent)) = patch.parent_id {
            if parent == id || descendants(&*storage, id).await?.contains(&parent) {
                return Err(Error::Cycle { goal: id, parent });
            }
            if storage.load_goal(parent).await?.is_none() {
                return Err(Error::invalid_reference("parent goal", parent));
            }
        }
        if let Some(value_ids) = &patch.value_ids {
            ensure_values(&*storage, value_ids).await?;
        }
        if let Some(habit_ids) = &patch.habit_ids {
            ensure_habits(&*storage, habit_ids).await?;
        }

        patch.apply(&mut goal)?;
        goal.updated_at = Utc::now();

        storage.begin().await?;
        let outcome = Self::write_goal(
            &mut *storage,
            &goal,
            patch.value_ids.as_deref(),
            patch.habit_ids.as_deref(),
        )
        .await;
        settle(&mut *storage, outcome, "update goal").await?;
        Ok(goal)
    }

    /// Change only the status of a goal.
    pub async fn update_goal_status(&self, id: GoalId, status: GoalStatus) -> Result<Goal> {
        self.update_goal(
            id,
            GoalPatch {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    async fn write_goal(
        storage: &mut S,
        goal: &Goal,
        value_ids: Option<&[ValueId]>,
        habit_ids: Option<&[HabitId]>,
    ) -> Result<()> {
        storage.save_goal(goal).await?;
        let left = goal.id.as_ulid();
        if let Some(ids) = value_ids {
            let rights = ids.iter().map(ValueId::as_ulid);
            replace_links(storage, Association::GoalValue, left, rights).await?;
        }
        if let Some(ids) = habit_ids {
            let rights = ids.iter().map(HabitId::as_ulid);
            replace_links(storage, Association::GoalHabit, left, rights).await?;
        }
        Ok(())
    }

    /// The goal and all of its descendants.
    ///
    /// Traversal is breadth-first and visits every goal at most once, so it
    /// terminates even on data whose parent links form a cycle.
    pub async fn collect_descendant_ids(&self, id: GoalId) -> Result<BTreeSet<GoalId>> {
        let storage = self.storage.lock().await;
        descendants(&*storage, id).await
    }

    /// Delete a goal with its whole subtree and every check-in the subtree owns.
    ///
    /// Value and habit links of the deleted goals are cleared; the values and
    /// habits themselves stay. Returns `false` when the goal does not exist.
    pub async fn delete_goal(&self, id: GoalId) -> Result<bool> {
        let mut storage = self.storage.lock().await;
        if storage.load_goal(id).await?.is_none() {
            warn!("Goal {} not found for deletion", id);
            return Ok(false);
        }

        let closure: Vec<GoalId> = descendants(&*storage, id).await?.into_iter().collect();

        storage.begin().await?;
        let outcome = Self::delete_closure(&mut *storage, &closure).await;
        let (goals, check_ins) = settle(&mut *storage, outcome, "delete goal subtree").await?;

        info!("Deleted goal {} ({} goals, {} check-ins)", id, goals, check_ins);
        Ok(true)
    }

    async fn delete_closure(storage: &mut S, closure: &[GoalId]) -> Result<(usize, usize)> {
        let check_ins = storage.delete_check_ins_for_goals(closure).await?;
        for check_in in &check_ins {
            storage
                .clear_links(Association::CheckInHabit, LinkEnd::Left(check_in.as_ulid()))
                .await?;
        }
        for goal in closure {
            let end = LinkEnd::Left(goal.as_ulid());
            storage.clear_links(Association::GoalValue, end).await?;
            storage.clear_links(Association::GoalHabit, end).await?;
        }
        let goals = storage.delete_goals(closure).await?;
        Ok((goals, check_ins.len()))
    }

    /// Every goal as `(id, name, parent_id)`, ordered by name.
    pub async fn list_for_parent_selection(&self) -> Result<Vec<GoalOption>> {
        let goals = self.list_goals(&GoalFilter::default()).await?;
        Ok(goals
            .into_iter()
            .map(|g| GoalOption {
                id: g.id,
                name: g.name,
                parent_id: g.parent_id,
            })
            .collect())
    }

    /// All goals arranged as a forest.
    ///
    /// Goals whose parent is missing are roots. Goals only reachable through a
    /// parent cycle are reported as roots as well, so every goal appears once.
    pub async fn goal_tree(&self) -> Result<Vec<GoalNode>> {
        let goals = self.list_goals(&GoalFilter::default()).await?;
        let known: BTreeSet<GoalId> = goals.iter().map(|g| g.id).collect();

        let mut children: BTreeMap<GoalId, Vec<Goal>> = BTreeMap::new();
        let mut roots = Vec::new();
        for goal in goals {
            match goal.parent_id.filter(|p| known.contains(p)) {
                Some(parent) => children.entry(parent).or_default().push(goal),
                None => roots.push(goal),
            }
        }

        let mut visited = BTreeSet::new();
        let mut forest: Vec<GoalNode> = roots
            .into_iter()
            .map(|goal| build_node(goal, &children, &mut visited))
            .collect();

        // Whatever is left hangs off a cycle
        let stranded: Vec<Goal> = children
            .values()
            .flatten()
            .filter(|g| !visited.contains(&g.id))
            .cloned()
            .collect();
        for goal in stranded {
            if !visited.contains(&goal.id) {
                warn!("Goal {} is part of a parent cycle", goal.id);
                forest.push(build_node(goal, &children, &mut visited));
            }
        }
        Ok(forest)
    }

    // === Links ===

    /// Mark `habit_id` as supporting `goal_id`. Linking twice is a no-op.
    pub async fn link_habit(&self, goal_id: GoalId, habit_id: HabitId) -> Result<()> {
        let mut storage = self.storage.lock().await;
        if storage.load_goal(goal_id).await?.is_none() {
            return Err(Error::not_found("goal", goal_id));
        }
        if storage.load_habit(habit_id).await?.is_none() {
            return Err(Error::not_found("habit", habit_id));
        }

        storage.begin().await?;
        let outcome = storage
            .link(Association::GoalHabit, goal_id.as_ulid(), habit_id.as_ulid())
            .await
            .map_err(Error::from);
        settle(&mut *storage, outcome, "link habit to goal").await
    }

    /// Values served by a goal, ordered by name.
    pub async fn goal_values(&self, id: GoalId) -> Result<Vec<Value>> {
        let storage = self.storage.lock().await;
        let mut values = Vec::new();
        for ulid in storage.linked(Association::GoalValue, LinkEnd::Left(id.as_ulid())).await? {
            if let Some(value) = storage.load_value(ValueId::from(ulid)).await? {
                values.push(value);
            }
        }
        values.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(values)
    }

    /// Habits supporting a goal, ordered by name.
    pub async fn supporting_habits(&self, id: GoalId) -> Result<Vec<Habit>> {
        let storage = self.storage.lock().await;
        linked_habits(&*storage, Association::GoalHabit, id.as_ulid()).await
    }

    // === Check-ins ===

    /// Record a check-in on a goal.
    pub async fn create_check_in(&self, goal_id: GoalId, new: NewCheckIn) -> Result<GoalCheckIn> {
        let progress = validate_progress(new.progress_percentage)?;

        let mut storage = self.storage.lock().await;
        if storage.load_goal(goal_id).await?.is_none() {
            return Err(Error::not_found("goal", goal_id));
        }
        ensure_habits(&*storage, &new.contributing_habit_ids).await?;

        let now = Utc::now();
        let check_in = GoalCheckIn {
            id: CheckInId::new(),
            goal_id,
            check_in_date: new.check_in_date.unwrap_or(now),
            reflection: new.reflection,
            progress_percentage: progress,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };

        storage.begin().await?;
        let outcome =
            Self::write_check_in(&mut *storage, &check_in, Some(&new.contributing_habit_ids)).await;
        settle(&mut *storage, outcome, "create check-in").await?;

        debug!("Check-in {} on goal {} at {}%", check_in.id, goal_id, progress);
        Ok(check_in)
    }

    /// Edit an existing check-in.
    pub async fn edit_check_in(&self, id: CheckInId, patch: CheckInPatch) -> Result<GoalCheckIn> {
        let mut storage = self.storage.lock().await;
        let mut check_in = storage
            .load_check_in(id)
            .await?
            .ok_or_else(|| Error::not_found("check-in", id))?;
        if let Some(habit_ids) = &patch.contributing_habit_ids {
            ensure_habits(&*storage, habit_ids).await?;
        }

        patch.apply(&mut check_in)?;
        check_in.updated_at = Utc::now();

        storage.begin().await?;
        let outcome = Self::write_check_in(
            &mut *storage,
            &check_in,
            patch.contributing_habit_ids.as_deref(),
        )
        .await;
        settle(&mut *storage, outcome, "edit check-in").await?;
        Ok(check_in)
    }

    async fn write_check_in(
        storage: &mut S,
        check_in: &GoalCheckIn,
        habit_ids: Option<&[HabitId]>,
    ) -> Result<()> {
        storage.save_check_in(check_in).await?;
        if let Some(ids) = habit_ids {
            replace_links(
                storage,
                Association::CheckInHabit,
                check_in.id.as_ulid(),
                ids.iter().map(HabitId::as_ulid),
            )
            .await?;
        }
        Ok(())
    }

    /// Habits recorded as contributing to a check-in, ordered by name.
    pub async fn contributing_habits(&self, check_in_id: CheckInId) -> Result<Vec<Habit>> {
        let storage = self.storage.lock().await;
        linked_habits(&*storage, Association::CheckInHabit, check_in_id.as_ulid()).await
    }

    /// Check-ins of a goal, newest first.
    pub async fn check_ins(&self, goal_id: GoalId) -> Result<Vec<GoalCheckIn>> {
        Ok(self
            .storage
            .lock()
            .await
            .list_check_ins(&CheckInFilter::for_goal(goal_id))
            .await?)
    }
}

/// Breadth-first closure of `root` over child links, `root` included.
async fn descendants<S: Storage + ?Sized>(storage: &S, root: GoalId) -> Result<BTreeSet<GoalId>> {
    let mut closure = BTreeSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(current) = queue.pop_front() {
        for child in storage.list_goals(&GoalFilter::children_of(current)).await? {
            if closure.insert(child.id) {
                queue.push_back(child.id);
            }
        }
    }
    Ok(closure)
}

fn build_node(
    goal: Goal,
    children: &BTreeMap<GoalId, Vec<Goal>>,
    visited: &mut BTreeSet<GoalId>,
) -> GoalNode {
    visited.insert(goal.id);
    let mut node_children = Vec::new();
    if let Some(kids) = children.get(&goal.id) {
        for child in kids {
            if !visited.contains(&child.id) {
                node_children.push(build_node(child.clone(), children, visited));
            }
        }
    }
    GoalNode {
        goal,
        children: node_children,
    }
}

async fn replace_links<S: Storage + ?Sized>(
    storage: &mut S,
    association: Association,
    left: Ulid,
    rights: impl Iterator<Item = Ulid>,
) -> Result<()> {
    storage.clear_links(association, LinkEnd::Left(left)).await?;
    for right in rights {
        storage.link(association, left, right).await?;
    }
    Ok(())
}

async fn linked_habits<S: Storage + ?Sized>(
    storage: &S,
    association: Association,
    left: Ulid,
) -> Result<Vec<Habit>> {
    let mut habits = Vec::new();
    for ulid in storage.linked(association, LinkEnd::Left(left)).await? {
        if let Some(habit) = storage.load_habit(HabitId::from(ulid)).await? {
            habits.push(habit);
        }
    }
    habits.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(habits)
}

async fn ensure_values<S: Storage + ?Sized>(storage: &S, ids: &[ValueId]) -> Result<()> {
    for id in ids {
        if storage.load_value(*id).await?.is_none() {
            return Err(Error::invalid_reference("value", id));
        }
    }
    Ok(())
}

async fn ensure_habits<S: Storage + ?Sized>(storage: &S, ids: &[HabitId]) -> Result<()> {
    for id in ids {
        if storage.load_habit(*id).await?.is_none() {
            return Err(Error::invalid_reference("habit", id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_core::{CompletionType, Frequency, HabitStatus, WeekdaySet};
    use lifeline_storage::testing::{Fault, FaultyStorage};
    use lifeline_storage::JsonStorage;

    fn manager() -> (GoalHierarchyManager<JsonStorage>, Arc<Mutex<JsonStorage>>) {
        let storage = Arc::new(Mutex::new(JsonStorage::in_memory()));
        (GoalHierarchyManager::new(storage.clone()), storage)
    }

    fn raw_goal(name: &str, parent: Option<GoalId>) -> Goal {
        Goal {
            id: GoalId::new(),
            name: name.to_string(),
            description: String::new(),
            target_date: None,
            status: GoalStatus::NotStarted,
            parent_id: parent,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seed_habit<S: Storage>(storage: &Arc<Mutex<S>>, name: &str) -> Habit {
        let habit = Habit {
            id: HabitId::new(),
            name: name.to_string(),
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
        let mut s = storage.lock().await;
        s.begin().await.unwrap();
        s.save_habit(&habit).await.unwrap();
        s.commit("seed habit").await.unwrap();
        habit
    }

    fn check_in(progress: f64) -> NewCheckIn {
        NewCheckIn {
            reflection: "steady".to_string(),
            progress_percentage: progress,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_goal_with_unknown_parent() {
        let (manager, _) = manager();
        let result = manager.create_goal(NewGoal::named("Orphan").under(GoalId::new())).await;
        assert!(matches!(result, Err(Error::InvalidReference { .. })));
    }

    #[tokio::test]
    async fn test_create_goal_rejects_blank_name() {
        let (manager, _) = manager();
        let result = manager.create_goal(NewGoal::named("")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_goal_with_unknown_habit_writes_nothing() {
        let (manager, storage) = manager();
        let mut new = NewGoal::named("Fit");
        new.habit_ids = vec![HabitId::new()];
        let result = manager.create_goal(new).await;
        assert!(matches!(result, Err(Error::InvalidReference { kind: "habit", .. })));
        assert!(storage.lock().await.list_goals(&GoalFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cascade_delete_removes_subtree_and_check_ins() {
        let (manager, storage) = manager();
        let a = manager.create_goal(NewGoal::named("A")).await.unwrap();
        let b = manager.create_goal(NewGoal::named("B").under(a.id)).await.unwrap();
        let c = manager.create_goal(NewGoal::named("C").under(b.id)).await.unwrap();
        let other = manager.create_goal(NewGoal::named("Other")).await.unwrap();
        for goal in [&a, &b, &c, &other] {
            manager.create_check_in(goal.id, check_in(10.0)).await.unwrap();
        }

        let closure = manager.collect_descendant_ids(a.id).await.unwrap();
        assert_eq!(closure, BTreeSet::from([a.id, b.id, c.id]));

        assert!(manager.delete_goal(a.id).await.unwrap());
        for goal in [&a, &b, &c] {
            assert!(manager.get_goal(goal.id).await.unwrap().is_none());
        }

        let s = storage.lock().await;
        let remaining = s.list_check_ins(&CheckInFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].goal_id, other.id);
        drop(s);

        assert!(!manager.delete_goal(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_keeps_linked_habits() {
        let (manager, storage) = manager();
        let habit = seed_habit(&storage, "Run").await;
        let mut new = NewGoal::named("Marathon");
        new.habit_ids = vec![habit.id];
        let goal = manager.create_goal(new).await.unwrap();
        let mut ci = check_in(40.0);
        ci.contributing_habit_ids = vec![habit.id];
        let ci = manager.create_check_in(goal.id, ci).await.unwrap();
        assert_eq!(manager.contributing_habits(ci.id).await.unwrap().len(), 1);

        assert!(manager.delete_goal(goal.id).await.unwrap());

        let s = storage.lock().await;
        assert!(s.load_habit(habit.id).await.unwrap().is_some());
        let end = LinkEnd::Right(habit.id.as_ulid());
        assert!(s.linked(Association::GoalHabit, end).await.unwrap().is_empty());
        assert!(s.linked(Association::CheckInHabit, end).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_cycle_terminates() {
        let (manager, storage) = manager();
        let mut x = raw_goal("X", None);
        let y = raw_goal("Y", Some(x.id));
        x.parent_id = Some(y.id);
        {
            let mut s = storage.lock().await;
            s.begin().await.unwrap();
            s.save_goal(&x).await.unwrap();
            s.save_goal(&y).await.unwrap();
            s.commit("seed cycle").await.unwrap();
        }

        let closure = manager.collect_descendant_ids(x.id).await.unwrap();
        assert_eq!(closure, BTreeSet::from([x.id, y.id]));

        let tree = manager.goal_tree().await.unwrap();
        assert_eq!(tree.iter().map(GoalNode::len).sum::<usize>(), 2);

        assert!(manager.delete_goal(y.id).await.unwrap());
        assert!(manager.list_for_parent_selection().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reparent_rejects_cycles() {
        let (manager, _) = manager();
        let a = manager.create_goal(NewGoal::named("A")).await.unwrap();
        let b = manager.create_goal(NewGoal::named("B").under(a.id)).await.unwrap();
        let c = manager.create_goal(NewGoal::named("C").under(b.id)).await.unwrap();

        let reparent = |parent: GoalId| GoalPatch {
            parent_id: Some(Some(parent)),
            ..Default::default()
        };
        let result = manager.update_goal(a.id, reparent(a.id)).await;
        assert!(matches!(result, Err(Error::Cycle { .. })));

        let result = manager.update_goal(a.id, reparent(c.id)).await;
        assert!(matches!(result, Err(Error::Cycle { .. })));

        let onto_missing = reparent(GoalId::new());
        assert!(matches!(
            manager.update_goal(c.id, onto_missing).await,
            Err(Error::InvalidReference { .. })
        ));

        let detach = GoalPatch { parent_id: Some(None), ..Default::default() };
        let c = manager.update_goal(c.id, detach).await.unwrap();
        assert!(c.parent_id.is_none());
        assert_eq!(manager.root_goals().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_goal() {
        let (manager, _) = manager();
        let result = manager.update_goal_status(GoalId::new(), GoalStatus::Completed).await;
        assert!(matches!(result, Err(Error::NotFound { kind: "goal", .. })));
    }

    #[tokio::test]
    async fn test_goal_tree_nests_children() {
        let (manager, _) = manager();
        let a = manager.create_goal(NewGoal::named("A")).await.unwrap();
        manager.create_goal(NewGoal::named("A2").under(a.id)).await.unwrap();
        manager.create_goal(NewGoal::named("A1").under(a.id)).await.unwrap();
        manager.create_goal(NewGoal::named("B")).await.unwrap();

        let tree = manager.goal_tree().await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].goal.name, "A");
        let kids: Vec<_> = tree[0].children.iter().map(|n| n.goal.name.as_str()).collect();
        assert_eq!(kids, vec!["A1", "A2"]);
    }

    #[tokio::test]
    async fn test_link_habit_is_idempotent() {
        let (manager, storage) = manager();
        let habit = seed_habit(&storage, "Stretch").await;
        let goal = manager.create_goal(NewGoal::named("Flexible")).await.unwrap();

        manager.link_habit(goal.id, habit.id).await.unwrap();
        manager.link_habit(goal.id, habit.id).await.unwrap();
        assert_eq!(manager.supporting_habits(goal.id).await.unwrap().len(), 1);

        let result = manager.link_habit(goal.id, HabitId::new()).await;
        assert!(matches!(result, Err(Error::NotFound { kind: "habit", .. })));
    }

    #[tokio::test]
    async fn test_check_in_validation() {
        let (manager, _) = manager();
        let goal = manager.create_goal(NewGoal::named("Save")).await.unwrap();

        assert!(matches!(
            manager.create_check_in(goal.id, check_in(120.0)).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            manager.create_check_in(GoalId::new(), check_in(10.0)).await,
            Err(Error::NotFound { .. })
        ));

        let ci = manager.create_check_in(goal.id, check_in(10.0)).await.unwrap();
        let edited = manager
            .edit_check_in(
                ci.id,
                CheckInPatch {
                    progress_percentage: Some(55.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.progress_percentage, 55.0);
        assert_eq!(manager.check_ins(goal.id).await.unwrap().len(), 1);
    }

    #[derive(Debug, PartialEq)]
    struct Snapshot {
        goals: Vec<GoalId>,
        check_ins: Vec<CheckInId>,
        goal_habits: Vec<Ulid>,
        check_in_habits: Vec<Ulid>,
    }

    async fn snapshot<S: Storage>(storage: &S, habit: HabitId) -> Snapshot {
        let end = LinkEnd::Right(habit.as_ulid());
        let goals = storage.list_goals(&GoalFilter::default()).await.unwrap();
        let check_ins = storage.list_check_ins(&CheckInFilter::default()).await.unwrap();
        Snapshot {
            goals: goals.into_iter().map(|g| g.id).collect(),
            check_ins: check_ins.into_iter().map(|c| c.id).collect(),
            goal_habits: storage.linked(Association::GoalHabit, end).await.unwrap(),
            check_in_habits: storage.linked(Association::CheckInHabit, end).await.unwrap(),
        }
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_subtree_in_memory_and_on_disk() {
        let faults = [Fault::DeleteCheckIns, Fault::ClearLinks, Fault::DeleteGoals, Fault::Commit];
        for fault in faults {
            let dir = tempfile::tempdir().unwrap();
            let inner = JsonStorage::new(dir.path()).await.unwrap();
            let storage = Arc::new(Mutex::new(FaultyStorage::new(inner)));
            let manager = GoalHierarchyManager::new(storage.clone());
            let habit = seed_habit(&storage, "Run").await;

            let mut new = NewGoal::named("Marathon");
            new.habit_ids = vec![habit.id];
            let root = manager.create_goal(new).await.unwrap();
            let child = manager
                .create_goal(NewGoal::named("Half").under(root.id))
                .await
                .unwrap();
            let mut ci = check_in(30.0);
            ci.contributing_habit_ids = vec![habit.id];
            manager.create_check_in(child.id, ci).await.unwrap();

            let before = snapshot(&*storage.lock().await, habit.id).await;
            assert_eq!(before.goals.len(), 2);
            assert_eq!(before.check_in_habits.len(), 1);

            storage.lock().await.fail_on(fault);
            let result = manager.delete_goal(root.id).await;
            assert!(matches!(result, Err(Error::Persistence(_))), "{:?}", fault);

            let after = snapshot(&*storage.lock().await, habit.id).await;
            assert_eq!(after, before, "in memory after {:?}", fault);

            let reopened = JsonStorage::new(dir.path()).await.unwrap();
            let on_disk = snapshot(&reopened, habit.id).await;
            assert_eq!(on_disk, before, "on disk after {:?}", fault);
        }
    }
}

//! Goal model - long-term objectives arranged in a parent/child hierarchy.

use crate::error::{Error, Result};
use crate::id::{CheckInId, GoalId, HabitId, ValueId};
use crate::Time;
use serde::{Deserialize, Serialize};

/// A goal, optionally nested under a parent goal.
///
/// The hierarchy is stored flat: `parent_id` is a plain foreign key and every
/// traversal goes through explicit closure computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier
    pub id: GoalId,

    /// Goal name
    pub name: String,

    /// Detailed description
    pub description: String,

    /// When the goal should be reached
    pub target_date: Option<Time>,

    /// Goal status
    pub status: GoalStatus,

    /// Parent goal, `None` for a root goal
    pub parent_id: Option<GoalId>,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

/// Goal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Not started yet
    #[default]
    NotStarted,
    /// Being worked on
    InProgress,
    /// Reached
    Completed,
    /// Paused
    OnHold,
    /// Abandoned
    Cancelled,
}

impl GoalStatus {
    /// Stable string form, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::NotStarted => "not_started",
            GoalStatus::InProgress => "in_progress",
            GoalStatus::Completed => "completed",
            GoalStatus::OnHold => "on_hold",
            GoalStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(GoalStatus::NotStarted),
            "in_progress" => Ok(GoalStatus::InProgress),
            "completed" => Ok(GoalStatus::Completed),
            "on_hold" => Ok(GoalStatus::OnHold),
            "cancelled" => Ok(GoalStatus::Cancelled),
            other => Err(Error::validation(format!("unknown goal status '{other}'"))),
        }
    }
}

/// A dated reflection on a goal's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalCheckIn {
    /// Unique identifier
    pub id: CheckInId,

    /// Owning goal
    pub goal_id: GoalId,

    /// When the check-in happened
    pub check_in_date: Time,

    /// Free-form reflection
    pub reflection: String,

    /// Progress estimate (0-100)
    pub progress_percentage: f64,

    /// Additional notes
    pub notes: Option<String>,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

/// Attributes for a new goal.
#[derive(Debug, Clone, Default)]
pub struct NewGoal {
    /// Goal name, must not be blank
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Optional deadline
    pub target_date: Option<Time>,
    /// Initial status
    pub status: GoalStatus,
    /// Parent goal, `None` for a root goal
    pub parent_id: Option<GoalId>,
    /// Values this goal serves
    pub value_ids: Vec<ValueId>,
    /// Habits supporting this goal
    pub habit_ids: Vec<HabitId>,
}

impl NewGoal {
    /// A root goal with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Place the goal under `parent`.
    pub fn under(mut self, parent: GoalId) -> Self {
        self.parent_id = Some(parent);
        self
    }
}

/// Partial update of a goal. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct GoalPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// `Some(None)` clears the target date
    pub target_date: Option<Option<Time>>,
    /// New status
    pub status: Option<GoalStatus>,
    /// `Some(None)` detaches the goal to the root
    pub parent_id: Option<Option<GoalId>>,
    /// Replaces the linked value set
    pub value_ids: Option<Vec<ValueId>>,
    /// Replaces the supporting habit set
    pub habit_ids: Option<Vec<HabitId>>,
}

impl GoalPatch {
    /// Apply the scalar fields to `goal`. Links and parent are handled by the
    /// hierarchy manager, which has to validate them against the store.
    pub fn apply(&self, goal: &mut Goal) -> Result<()> {
        if let Some(name) = &self.name {
            crate::error::require_name("goal name", name)?;
            goal.name = name.clone();
        }
        if let Some(description) = &self.description {
            goal.description = description.clone();
        }
        if let Some(target_date) = self.target_date {
            goal.target_date = target_date;
        }
        if let Some(status) = self.status {
            goal.status = status;
        }
        if let Some(parent_id) = self.parent_id {
            goal.parent_id = parent_id;
        }
        Ok(())
    }
}

/// Attributes for a new check-in.
#[derive(Debug, Clone, Default)]
pub struct NewCheckIn {
    /// What went well or badly
    pub reflection: String,
    /// Self-assessed progress in `[0, 100]`
    pub progress_percentage: f64,
    /// Optional extra notes
    pub notes: Option<String>,
    /// Defaults to now
    pub check_in_date: Option<Time>,
    /// Habits that contributed to this progress
    pub contributing_habit_ids: Vec<HabitId>,
}

/// Explicit edit of an existing check-in.
#[derive(Debug, Clone, Default)]
pub struct CheckInPatch {
    /// New reflection
    pub reflection: Option<String>,
    /// New progress, validated like on creation
    pub progress_percentage: Option<f64>,
    /// `Some(None)` clears the notes
    pub notes: Option<Option<String>>,
    /// Move the check-in to another instant
    pub check_in_date: Option<Time>,
    /// Replaces the contributing habit set
    pub contributing_habit_ids: Option<Vec<HabitId>>,
}

impl CheckInPatch {
    /// Apply the scalar fields to `check_in`.
    pub fn apply(&self, check_in: &mut GoalCheckIn) -> Result<()> {
        if let Some(reflection) = &self.reflection {
            check_in.reflection = reflection.clone();
        }
        if let Some(progress) = self.progress_percentage {
            check_in.progress_percentage = validate_progress(progress)?;
        }
        if let Some(notes) = &self.notes {
            check_in.notes = notes.clone();
        }
        if let Some(date) = self.check_in_date {
            check_in.check_in_date = date;
        }
        Ok(())
    }
}

/// Progress percentages must lie in `[0, 100]`.
pub fn validate_progress(value: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&value) {
        return Err(Error::validation(format!(
            "progress percentage {value} outside 0-100"
        )));
    }
    Ok(value)
}

/// Flattened goal row used to populate parent pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalOption {
    /// Goal id
    pub id: GoalId,
    /// Goal name
    pub name: String,
    /// Parent goal id
    pub parent_id: Option<GoalId>,
}

/// A goal with its sub-goals, as rendered in tree views.
#[derive(Debug, Clone, Serialize)]
pub struct GoalNode {
    /// The goal itself
    pub goal: Goal,
    /// Direct sub-goals, each with their own subtree
    pub children: Vec<GoalNode>,
}

impl GoalNode {
    /// Number of goals in this subtree, including the root.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(GoalNode::len).sum::<usize>()
    }

    /// A node always contains at least its own goal.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn goal() -> Goal {
        Goal {
            id: GoalId::new(),
            name: "Run a marathon".to_string(),
            description: String::new(),
            target_date: None,
            status: GoalStatus::NotStarted,
            parent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_rejects_unknown_values() {
        assert!(serde_json::from_str::<GoalStatus>("\"someday\"").is_err());
        assert!("someday".parse::<GoalStatus>().is_err());
        assert_eq!(
            serde_json::from_str::<GoalStatus>("\"on_hold\"").unwrap(),
            GoalStatus::OnHold
        );
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut g = goal();
        let patch = GoalPatch {
            status: Some(GoalStatus::InProgress),
            ..Default::default()
        };
        patch.apply(&mut g).unwrap();
        assert_eq!(g.status, GoalStatus::InProgress);
        assert_eq!(g.name, "Run a marathon");
    }

    #[test]
    fn test_patch_rejects_blank_name() {
        let mut g = goal();
        let patch = GoalPatch {
            name: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(patch.apply(&mut g), Err(Error::Validation(_))));
    }

    #[test]
    fn test_patch_can_detach_parent() {
        let mut g = goal();
        g.parent_id = Some(GoalId::new());
        let patch = GoalPatch {
            parent_id: Some(None),
            ..Default::default()
        };
        patch.apply(&mut g).unwrap();
        assert!(g.parent_id.is_none());
    }

    #[test]
    fn test_progress_bounds() {
        assert!(validate_progress(0.0).is_ok());
        assert!(validate_progress(100.0).is_ok());
        assert!(validate_progress(100.5).is_err());
        assert!(validate_progress(-1.0).is_err());
    }
}

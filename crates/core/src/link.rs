//! Non-owning many-to-many associations between entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Named association tables. The left side is listed first in the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Association {
    /// Goal (left) serves Value (right)
    GoalValue,
    /// Goal (left) is supported by Habit (right)
    GoalHabit,
    /// GoalCheckIn (left) was contributed to by Habit (right)
    CheckInHabit,
}

impl Association {
    /// Stable string form, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Association::GoalValue => "goal_value",
            Association::GoalHabit => "goal_habit",
            Association::CheckInHabit => "check_in_habit",
        }
    }
}

/// One row of an association table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Table the row belongs to
    pub association: Association,

    /// Id on the left side of the table name
    pub left: Ulid,

    /// Id on the right side of the table name
    pub right: Ulid,
}

/// Which side of an association is fixed in a lookup or bulk removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEnd {
    /// Match rows whose left id equals this
    Left(Ulid),
    /// Match rows whose right id equals this
    Right(Ulid),
}

impl Link {
    /// Whether this row belongs to `association` and has `end` fixed.
    pub fn matches(&self, association: Association, end: LinkEnd) -> bool {
        self.association == association
            && match end {
                LinkEnd::Left(id) => self.left == id,
                LinkEnd::Right(id) => self.right == id,
            }
    }

    /// The id on the opposite side of `end`.
    pub fn other(&self, end: LinkEnd) -> Ulid {
        match end {
            LinkEnd::Left(_) => self.right,
            LinkEnd::Right(_) => self.left,
        }
    }
}

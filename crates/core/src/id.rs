//! Unique identifiers for lifeline entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a new identifier.
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// The underlying ULID, used as an association key.
            pub fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a Goal
    GoalId
);
entity_id!(
    /// Unique identifier for a GoalCheckIn
    CheckInId
);
entity_id!(
    /// Unique identifier for a Habit
    HabitId
);
entity_id!(
    /// Unique identifier for a HabitEntry
    EntryId
);
entity_id!(
    /// Unique identifier for a HabitGoal
    HabitGoalId
);
entity_id!(
    /// Unique identifier for a Value
    ValueId
);
entity_id!(
    /// Unique identifier for a DatedNote
    NoteId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trips_through_string() {
        let id = GoalId::new();
        let parsed: GoalId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!("not-a-ulid".parse::<HabitId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = ValueId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}

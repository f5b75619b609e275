//! Habit model - recurring activities, their daily entries and long-horizon targets.

use crate::error::{Error, Result};
use crate::id::{EntryId, HabitGoalId, HabitId};
use crate::Time;
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A recurring habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    /// Unique identifier
    pub id: HabitId,

    /// Habit name
    pub name: String,

    /// Detailed description
    pub description: String,

    /// Recurrence rule
    pub frequency: Frequency,

    /// Due weekdays, only meaningful for [`Frequency::SpecificDays`]
    #[serde(default)]
    pub specific_days_of_week: WeekdaySet,

    /// How completion is measured
    pub completion_type: CompletionType,

    /// Target for quantitative/duration habits
    pub target_value: Option<f64>,

    /// Display unit ("km", "minutes", ...)
    pub unit: Option<String>,

    /// Whether the habit is being tracked
    pub status: HabitStatus,

    /// When created. Weekly and monthly habits are anchored to this date.
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

/// Recurrence rule of a habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Every day
    Daily,
    /// Once a week, on the weekday the habit was created
    Weekly,
    /// Once a month, on the day-of-month the habit was created
    Monthly,
    /// On the weekdays listed in `specific_days_of_week`
    SpecificDays,
}

impl Frequency {
    /// Stable string form, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::SpecificDays => "specific_days",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "specific_days" => Ok(Frequency::SpecificDays),
            other => Err(Error::validation(format!("unknown frequency '{other}'"))),
        }
    }
}

/// How a habit's completion is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionType {
    /// Done or not done
    #[default]
    Binary,
    /// A measured amount, e.g. pages read
    Quantitative,
    /// A measured duration, e.g. minutes meditated
    Duration,
}

impl CompletionType {
    /// Stable string form, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionType::Binary => "binary",
            CompletionType::Quantitative => "quantitative",
            CompletionType::Duration => "duration",
        }
    }

    /// Whether entries carry a numeric value.
    pub fn is_measured(&self) -> bool {
        !matches!(self, CompletionType::Binary)
    }
}

impl std::str::FromStr for CompletionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "binary" => Ok(CompletionType::Binary),
            "quantitative" => Ok(CompletionType::Quantitative),
            "duration" => Ok(CompletionType::Duration),
            other => Err(Error::validation(format!("unknown completion type '{other}'"))),
        }
    }
}

/// Habit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitStatus {
    /// Tracked and scheduled
    #[default]
    Active,
    /// Kept for history, never due
    Inactive,
}

impl HabitStatus {
    /// Stable string form, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            HabitStatus::Active => "active",
            HabitStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for HabitStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(HabitStatus::Active),
            "inactive" => Ok(HabitStatus::Inactive),
            other => Err(Error::validation(format!("unknown habit status '{other}'"))),
        }
    }
}

/// A set of weekdays, indexed Monday = 0 through Sunday = 6.
///
/// Serialized as a sorted list of indices; any index above 6 is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// The empty set.
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    /// Build from weekday indices.
    pub fn from_indices(indices: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut bits = 0u8;
        for index in indices {
            if index > 6 {
                return Err(Error::validation(format!("weekday index {index} outside 0-6")));
            }
            bits |= 1u8 << index;
        }
        Ok(Self(bits))
    }

    /// Whether `day` is in the set.
    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1u8 << day.num_days_from_monday()) != 0
    }

    /// Whether no weekday is selected.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Member indices in ascending order.
    pub fn indices(&self) -> Vec<u8> {
        (0..7u8).filter(|i| self.0 & (1u8 << *i) != 0).collect()
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = Error;

    fn try_from(indices: Vec<u8>) -> Result<Self> {
        Self::from_indices(indices)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.indices()
    }
}

impl std::str::FromStr for WeekdaySet {
    type Err = Error;

    /// Parses the comma form, e.g. `"0,2,4"`. Empty segments are skipped.
    fn from_str(s: &str) -> Result<Self> {
        let mut indices = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let index = part
                .parse::<u8>()
                .map_err(|_| Error::validation(format!("invalid weekday index '{part}'")))?;
            indices.push(index);
        }
        Self::from_indices(indices)
    }
}

impl std::fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.indices().iter().map(u8::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// One day's log of a habit. At most one entry exists per habit and date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitEntry {
    /// Unique identifier
    pub id: EntryId,

    /// Owning habit
    pub habit_id: HabitId,

    /// Calendar day the entry is for
    pub completion_date: NaiveDate,

    /// Whether the habit was done
    pub completed: bool,

    /// Measured amount for quantitative/duration habits
    pub value: Option<f64>,

    /// Free-form notes
    pub notes: Option<String>,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

/// Fields written by a log action. A second log on the same date overwrites
/// all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFields {
    /// Marked done
    pub completed: bool,
    /// Measured amount
    pub value: Option<f64>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl EntryFields {
    /// A plain "done" log.
    pub fn done() -> Self {
        Self {
            completed: true,
            ..Default::default()
        }
    }
}

/// A long-horizon target attached to a habit, e.g. "run 100 km total".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitGoal {
    /// Unique identifier
    pub id: HabitGoalId,

    /// Owning habit
    pub habit_id: HabitId,

    /// Description of the target
    pub description: Option<String>,

    /// Deadline
    pub target_date: Option<Time>,

    /// Amount to reach
    pub target_value: Option<f64>,

    /// Amount reached so far
    pub current_value: f64,

    /// Whether the target was reached
    pub completed: bool,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

/// Attributes for a new habit.
#[derive(Debug, Clone)]
pub struct NewHabit {
    /// Habit name, must not be blank
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Recurrence rule
    pub frequency: Frequency,
    /// Weekdays for [`Frequency::SpecificDays`], ignored otherwise
    pub specific_days_of_week: WeekdaySet,
    /// How an entry counts as done
    pub completion_type: CompletionType,
    /// Amount that completes a measured habit
    pub target_value: Option<f64>,
    /// Unit of the measured amount
    pub unit: Option<String>,
    /// Initial status
    pub status: HabitStatus,
}

impl NewHabit {
    /// An active binary habit with the given recurrence.
    pub fn new(name: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            frequency,
            specific_days_of_week: WeekdaySet::EMPTY,
            completion_type: CompletionType::Binary,
            target_value: None,
            unit: None,
            status: HabitStatus::Active,
        }
    }
}

/// Partial update of a habit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct HabitPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New recurrence rule
    pub frequency: Option<Frequency>,
    /// New weekday set
    pub specific_days_of_week: Option<WeekdaySet>,
    /// New completion type
    pub completion_type: Option<CompletionType>,
    /// `Some(None)` clears the target
    pub target_value: Option<Option<f64>>,
    /// `Some(None)` clears the unit
    pub unit: Option<Option<String>>,
    /// New status
    pub status: Option<HabitStatus>,
}

impl HabitPatch {
    /// Apply to `habit`. Moving away from [`Frequency::SpecificDays`] clears
    /// the weekday set.
    pub fn apply(&self, habit: &mut Habit) -> Result<()> {
        if let Some(name) = &self.name {
            crate::error::require_name("habit name", name)?;
            habit.name = name.clone();
        }
        if let Some(description) = &self.description {
            habit.description = description.clone();
        }
        if let Some(days) = self.specific_days_of_week {
            habit.specific_days_of_week = days;
        }
        if let Some(frequency) = self.frequency {
            habit.frequency = frequency;
            if frequency != Frequency::SpecificDays {
                habit.specific_days_of_week = WeekdaySet::EMPTY;
            }
        }
        if let Some(completion_type) = self.completion_type {
            habit.completion_type = completion_type;
        }
        if let Some(target_value) = self.target_value {
            habit.target_value = validate_amount("target value", target_value)?;
        }
        if let Some(unit) = &self.unit {
            habit.unit = unit.clone();
        }
        if let Some(status) = self.status {
            habit.status = status;
        }
        Ok(())
    }
}

/// Attributes for a new habit goal.
#[derive(Debug, Clone, Default)]
pub struct NewHabitGoal {
    /// Description of the target
    pub description: Option<String>,
    /// Deadline
    pub target_date: Option<Time>,
    /// Amount to reach
    pub target_value: Option<f64>,
}

/// Measured amounts must be finite and non-negative.
pub fn validate_amount(field: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => {
            Err(Error::validation(format!("{field} must be a non-negative number, got {v}")))
        }
        other => Ok(other),
    }
}

/// Display status of a habit on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitDayStatus {
    /// The recurrence rule does not schedule the habit on this day
    NotDue,
    /// A completed entry exists
    Completed,
    /// A measured habit has an entry that has not reached completion
    InProgress,
    /// Due, nothing logged as done yet
    Pending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_set_parses_comma_form() {
        let set: WeekdaySet = "0,2,4".parse().unwrap();
        assert!(set.contains(Weekday::Mon));
        assert!(!set.contains(Weekday::Tue));
        assert!(set.contains(Weekday::Fri));
        assert_eq!(set.to_string(), "0,2,4");
    }

    #[test]
    fn test_weekday_set_skips_empty_segments() {
        let set: WeekdaySet = ",6,".parse().unwrap();
        assert_eq!(set.indices(), vec![6]);
        assert!("".parse::<WeekdaySet>().unwrap().is_empty());
    }

    #[test]
    fn test_weekday_set_rejects_out_of_range() {
        assert!("7".parse::<WeekdaySet>().is_err());
        assert!(serde_json::from_str::<WeekdaySet>("[1, 9]").is_err());
        let set: WeekdaySet = serde_json::from_str("[3, 1]").unwrap();
        assert_eq!(serde_json::to_string(&set).unwrap(), "[1,3]");
    }

    #[test]
    fn test_frequency_rejects_unknown_values() {
        assert!(serde_json::from_str::<Frequency>("\"fortnightly\"").is_err());
        assert_eq!(
            serde_json::from_str::<Frequency>("\"specific_days\"").unwrap(),
            Frequency::SpecificDays
        );
    }

    #[test]
    fn test_patch_clears_days_when_leaving_specific_days() {
        let mut habit = Habit {
            id: HabitId::new(),
            name: "Gym".to_string(),
            description: String::new(),
            frequency: Frequency::SpecificDays,
            specific_days_of_week: "0,2,4".parse().unwrap(),
            completion_type: CompletionType::Binary,
            target_value: None,
            unit: None,
            status: HabitStatus::Active,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let patch = HabitPatch {
            frequency: Some(Frequency::Daily),
            ..Default::default()
        };
        patch.apply(&mut habit).unwrap();
        assert!(habit.specific_days_of_week.is_empty());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("target", Some(-1.0)).is_err());
        assert!(validate_amount("target", Some(f64::NAN)).is_err());
        assert_eq!(validate_amount("target", Some(5.0)).unwrap(), Some(5.0));
        assert_eq!(validate_amount("target", None).unwrap(), None);
    }
}

//! Domain error kinds shared by every lifeline service.

use crate::id::GoalId;

/// Result alias for domain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the goal and habit services.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entity addressed by the operation does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("goal", "habit", ...)
        kind: &'static str,
        /// Offending id
        id: String,
    },

    /// A foreign id (parent, linked habit or value) does not resolve
    #[error("invalid {kind} reference: {id}")]
    InvalidReference {
        /// Entity kind the reference points at
        kind: &'static str,
        /// Offending id
        id: String,
    },

    /// Re-parenting would make a goal its own ancestor
    #[error("goal {goal} cannot be placed under {parent}: cycle")]
    Cycle {
        /// Goal being moved
        goal: GoalId,
        /// Proposed parent
        parent: GoalId,
    },

    /// A field failed validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backing store failed
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }

    /// Shorthand for [`Error::InvalidReference`].
    pub fn invalid_reference(kind: &'static str, id: impl ToString) -> Self {
        Self::InvalidReference { kind, id: id.to_string() }
    }

    /// Shorthand for [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Reject names that are empty once trimmed.
pub fn require_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} must not be blank")));
    }
    Ok(())
}

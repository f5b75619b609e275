//! Personal values that goals can serve.

use crate::id::ValueId;
use crate::Time;
use serde::{Deserialize, Serialize};

/// A personal value ("health", "family", ...). Linked to goals many-to-many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// Unique identifier
    pub id: ValueId,

    /// Value name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

/// Partial update of a value.
#[derive(Debug, Clone, Default)]
pub struct ValuePatch {
    /// New name
    pub name: Option<String>,

    /// New description; `Some(None)` clears it
    pub description: Option<Option<String>>,
}

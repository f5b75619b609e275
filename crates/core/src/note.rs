//! Free-form notes pinned to a calendar day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::id::NoteId;
use crate::Time;

/// A note written for a specific day. Several notes may share a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedNote {
    /// Unique identifier
    pub id: NoteId,

    /// Day the note belongs to
    pub note_date: NaiveDate,

    /// Note text
    pub content: String,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

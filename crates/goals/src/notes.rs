//! Day notes shown on the calendar.

use chrono::{NaiveDate, Utc};
use lifeline_core::{DatedNote, Error, NoteFilter, NoteId, Result, SortOrder};
use lifeline_storage::{settle, Storage};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Notes pinned to calendar days.
pub struct NoteService<S: Storage> {
    storage: Arc<Mutex<S>>,
}

impl<S: Storage> NoteService<S> {
    /// Create a new note service over a shared store.
    pub fn new(storage: Arc<Mutex<S>>) -> Self {
        Self { storage }
    }

    /// Notes of `date`, most recently written first.
    pub async fn notes_for_date(&self, date: NaiveDate) -> Result<Vec<DatedNote>> {
        let filter = NoteFilter::on_date(date);
        Ok(self.storage.lock().await.list_notes(&filter).await?)
    }

    /// The most recently written note of `date`.
    pub async fn latest_note_for_date(&self, date: NaiveDate) -> Result<Option<DatedNote>> {
        let filter = NoteFilter {
            limit: Some(1),
            ..NoteFilter::on_date(date)
        };
        let notes = self.storage.lock().await.list_notes(&filter).await?;
        Ok(notes.into_iter().next())
    }

    /// Add a note to `date`. Earlier notes of the same day are kept.
    pub async fn save_note_for_date(
        &self,
        date: NaiveDate,
        content: impl Into<String>,
    ) -> Result<DatedNote> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::validation("note content must not be empty"));
        }

        let now = Utc::now();
        let note = DatedNote {
            id: NoteId::new(),
            note_date: date,
            content,
            created_at: now,
            updated_at: now,
        };

        let mut storage = self.storage.lock().await;
        storage.begin().await?;
        let outcome = storage.save_note(&note).await.map_err(Error::from);
        settle(&mut *storage, outcome, "save note").await?;
        info!("Saved note {} for {}", note.id, date);
        Ok(note)
    }

    /// Delete a note. Returns `false` when it does not exist.
    pub async fn delete_note(&self, id: NoteId) -> Result<bool> {
        let mut storage = self.storage.lock().await;
        if storage.load_note(id).await?.is_none() {
            warn!("Note {} not found for deletion", id);
            return Ok(false);
        }

        storage.begin().await?;
        let outcome = storage.delete_note(id).await.map_err(Error::from);
        settle(&mut *storage, outcome, "delete note").await
    }

    /// Every note, latest day first and newest first within a day.
    pub async fn all_notes(&self) -> Result<Vec<DatedNote>> {
        let filter = NoteFilter {
            order: SortOrder::Descending,
            ..Default::default()
        };
        Ok(self.storage.lock().await.list_notes(&filter).await?)
    }

    /// Notes dated within `[start, end]`, oldest first.
    pub async fn notes_in_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DatedNote>> {
        if start > end {
            return Err(Error::validation(format!("period start {start} is after end {end}")));
        }
        let filter = NoteFilter {
            from: Some(start),
            until: Some(end),
            ..Default::default()
        };
        Ok(self.storage.lock().await.list_notes(&filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_storage::JsonStorage;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn service() -> NoteService<JsonStorage> {
        NoteService::new(Arc::new(Mutex::new(JsonStorage::in_memory())))
    }

    #[tokio::test]
    async fn test_notes_for_date_newest_first() {
        let notes = service();
        notes.save_note_for_date(day(3), "morning").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let evening = notes.save_note_for_date(day(3), "evening").await.unwrap();
        notes.save_note_for_date(day(4), "next day").await.unwrap();

        let contents: Vec<_> = notes
            .notes_for_date(day(3))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.content)
            .collect();
        assert_eq!(contents, vec!["evening", "morning"]);
        assert_eq!(notes.latest_note_for_date(day(3)).await.unwrap(), Some(evening));
        assert!(notes.latest_note_for_date(day(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_note_is_rejected() {
        let notes = service();
        let result = notes.save_note_for_date(day(1), "   ").await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(notes.all_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_note() {
        let notes = service();
        let note = notes.save_note_for_date(day(1), "draft").await.unwrap();
        assert!(notes.delete_note(note.id).await.unwrap());
        assert!(!notes.delete_note(note.id).await.unwrap());
        assert!(notes.notes_for_date(day(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_notes_and_period() {
        let notes = service();
        for (d, text) in [(10, "ten"), (2, "two"), (20, "twenty")] {
            notes.save_note_for_date(day(d), text).await.unwrap();
        }

        let all: Vec<_> = notes.all_notes().await.unwrap().into_iter().map(|n| n.content).collect();
        assert_eq!(all, vec!["twenty", "ten", "two"]);

        let period: Vec<_> = notes
            .notes_in_period(day(1), day(10))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.content)
            .collect();
        assert_eq!(period, vec!["two", "ten"]);

        assert!(matches!(
            notes.notes_in_period(day(10), day(1)).await,
            Err(Error::Validation(_))
        ));
    }
}

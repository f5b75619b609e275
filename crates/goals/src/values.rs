//! Personal values service.

use chrono::Utc;
use lifeline_core::{
    require_name, Association, Error, GoalId, LinkEnd, Result, Value, ValueId, ValuePatch,
};
use lifeline_storage::{settle, Storage};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// CRUD over personal values.
pub struct ValueService<S: Storage> {
    storage: Arc<Mutex<S>>,
}

impl<S: Storage> ValueService<S> {
    /// Create a new value service over a shared store.
    pub fn new(storage: Arc<Mutex<S>>) -> Self {
        Self { storage }
    }

    /// Create a value.
    pub async fn create_value(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Value> {
        let name = name.into();
        require_name("value name", &name)?;

        let now = Utc::now();
        let value = Value {
            id: ValueId::new(),
            name,
            description,
            created_at: now,
            updated_at: now,
        };

        let mut storage = self.storage.lock().await;
        storage.begin().await?;
        let outcome = storage.save_value(&value).await.map_err(Error::from);
        settle(&mut *storage, outcome, "create value").await?;
        Ok(value)
    }

    /// Load a value by ID.
    pub async fn get_value(&self, id: ValueId) -> Result<Option<Value>> {
        Ok(self.storage.lock().await.load_value(id).await?)
    }

    /// All values ordered by name.
    pub async fn list_values(&self) -> Result<Vec<Value>> {
        Ok(self.storage.lock().await.list_values().await?)
    }

    /// Apply a partial update to a value.
    pub async fn update_value(&self, id: ValueId, patch: ValuePatch) -> Result<Value> {
        let mut storage = self.storage.lock().await;
        let mut value = storage
            .load_value(id)
            .await?
            .ok_or_else(|| Error::not_found("value", id))?;

        if let Some(name) = patch.name {
            require_name("value name", &name)?;
            value.name = name;
        }
        if let Some(description) = patch.description {
            value.description = description;
        }
        value.updated_at = Utc::now();

        storage.begin().await?;
        let outcome = storage.save_value(&value).await.map_err(Error::from);
        settle(&mut *storage, outcome, "update value").await?;
        Ok(value)
    }

    /// Delete a value and its goal links. Goals are kept.
    pub async fn delete_value(&self, id: ValueId) -> Result<bool> {
        let mut storage = self.storage.lock().await;
        if storage.load_value(id).await?.is_none() {
            return Ok(false);
        }

        storage.begin().await?;
        let outcome = Self::delete_rows(&mut *storage, id).await;
        let unlinked = settle(&mut *storage, outcome, "delete value").await?;
        info!("Deleted value {} ({} goal links cleared)", id, unlinked);
        Ok(true)
    }

    async fn delete_rows(storage: &mut S, id: ValueId) -> Result<usize> {
        let unlinked = storage
            .clear_links(Association::GoalValue, LinkEnd::Right(id.as_ulid()))
            .await?;
        storage.delete_value(id).await?;
        Ok(unlinked)
    }

    /// Goals serving a value.
    pub async fn goals_for_value(&self, id: ValueId) -> Result<Vec<GoalId>> {
        let storage = self.storage.lock().await;
        let ids = storage
            .linked(Association::GoalValue, LinkEnd::Right(id.as_ulid()))
            .await?;
        Ok(ids.into_iter().map(GoalId::from).collect())
    }
}

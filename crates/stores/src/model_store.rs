//! Model aggregate store

use async_trait::async_trait;
use dashmap::DashMap;

use common::error::{Error, Result};
use common::ids::ModelId;
use common::models::Model;

/// Store contract for the model aggregate
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Loads a model; absent or soft-deleted rows are not found
    async fn get(&self, id: ModelId) -> Result<Model>;

    /// Inserts a brand-new model row
    async fn insert(&self, model: Model) -> Result<()>;

    /// Persists changes to an existing model row
    async fn save(&self, model: Model) -> Result<()>;
}

/// In-memory arena implementation of [`ModelStore`]
pub struct InMemoryModelStore {
    /// Model rows keyed by id
    models: DashMap<ModelId, Model>,
}

impl InMemoryModelStore {
    /// Creates an empty store
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
        }
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn get(&self, id: ModelId) -> Result<Model> {
        match self.models.get(&id) {
            Some(model) if !model.deleted => Ok(model.clone()),
            _ => Err(Error::ModelNotFound(id)),
        }
    }

    async fn insert(&self, model: Model) -> Result<()> {
        if self.models.contains_key(&model.id) {
            return Err(Error::Internal(format!(
                "Model already exists: {}",
                model.id
            )));
        }
        self.models.insert(model.id, model);
        Ok(())
    }

    async fn save(&self, model: Model) -> Result<()> {
        if !self.models.contains_key(&model.id) {
            return Err(Error::ModelNotFound(model.id));
        }
        self.models.insert(model.id, model);
        Ok(())
    }
}

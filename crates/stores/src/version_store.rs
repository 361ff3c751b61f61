//! Model version store

use async_trait::async_trait;
use dashmap::DashMap;

use common::error::{Error, Result};
use common::ids::{ModelId, VersionId};
use common::models::ModelVersion;

/// Store contract for model versions
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Loads a version; absent or soft-deleted rows are not found
    async fn get(&self, id: VersionId) -> Result<ModelVersion>;

    /// Inserts a brand-new version row
    async fn insert(&self, version: ModelVersion) -> Result<()>;

    /// Persists changes to an existing version row
    async fn save(&self, version: ModelVersion) -> Result<()>;

    /// Tombstones a version; excluded from every query afterwards
    async fn soft_delete(&self, id: VersionId) -> Result<()>;

    /// All non-deleted versions of a model, in no particular order
    async fn list_by_model(&self, model_id: ModelId) -> Vec<ModelVersion>;

    /// All non-deleted versions still being worked on, across models
    async fn list_working(&self) -> Vec<ModelVersion>;
}

/// In-memory arena implementation of [`VersionStore`]
pub struct InMemoryVersionStore {
    /// Version rows keyed by id
    versions: DashMap<VersionId, ModelVersion>,
}

impl InMemoryVersionStore {
    /// Creates an empty store
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
        }
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn get(&self, id: VersionId) -> Result<ModelVersion> {
        match self.versions.get(&id) {
            Some(version) if !version.deleted => Ok(version.clone()),
            _ => Err(Error::VersionNotFound(id)),
        }
    }

    async fn insert(&self, version: ModelVersion) -> Result<()> {
        if self.versions.contains_key(&version.id) {
            return Err(Error::Internal(format!(
                "Version already exists: {}",
                version.id
            )));
        }
        self.versions.insert(version.id, version);
        Ok(())
    }

    async fn save(&self, version: ModelVersion) -> Result<()> {
        if !self.versions.contains_key(&version.id) {
            return Err(Error::VersionNotFound(version.id));
        }
        self.versions.insert(version.id, version);
        Ok(())
    }

    async fn soft_delete(&self, id: VersionId) -> Result<()> {
        match self.versions.get_mut(&id) {
            Some(mut version) => {
                version.deleted = true;
                version.touch();
                Ok(())
            }
            None => Err(Error::VersionNotFound(id)),
        }
    }

    async fn list_by_model(&self, model_id: ModelId) -> Vec<ModelVersion> {
        self.versions
            .iter()
            .filter(|entry| entry.model_id == model_id && !entry.deleted)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn list_working(&self) -> Vec<ModelVersion> {
        self.versions
            .iter()
            .filter(|entry| entry.is_working_on && !entry.deleted)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

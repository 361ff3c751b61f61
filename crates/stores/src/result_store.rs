//! Training result store
//!
//! One result row per version, keyed by the version id. The store exposes
//! a locked upsert so concurrent training ingestions for the same version
//! serialize instead of racing to insert duplicate rows or clobber each
//! other's fields.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use common::error::{Error, Result};
use common::ids::VersionId;
use common::models::ResultRecord;

/// Builds the row to persist from whatever currently exists under the key
pub type UpsertFn = Box<dyn FnOnce(Option<ResultRecord>) -> ResultRecord + Send>;

/// Store contract for training results
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Loads a result; absent or soft-deleted rows are not found
    async fn get(&self, version_id: VersionId) -> Result<ResultRecord>;

    /// Persists changes to an existing result row
    async fn save(&self, record: ResultRecord) -> Result<()>;

    /// Tombstones a result; excluded from every query afterwards
    async fn soft_delete(&self, version_id: VersionId) -> Result<()>;

    /// Lock-then-read-or-create-then-write primitive for training ingestion
    ///
    /// Acquires an exclusive per-version lock before reading the current
    /// row and writing the one returned by `build`. A soft-deleted row is
    /// presented to `build` as absent.
    async fn upsert_locked(&self, version_id: VersionId, build: UpsertFn) -> Result<ResultRecord>;
}

/// In-memory arena implementation of [`ResultStore`]
pub struct InMemoryResultStore {
    /// Result rows keyed by owning version id
    results: DashMap<VersionId, ResultRecord>,
    /// Per-version upsert locks
    ///
    /// Entries live for the store's lifetime, including past a version's
    /// soft-delete: reaping one while an upsert holds its `Arc` would let
    /// the next upsert for that version run unserialized.
    locks: DashMap<VersionId, Arc<Mutex<()>>>,
}

impl InMemoryResultStore {
    /// Creates an empty store
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            results: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Gets or creates the lock guarding one version's row
    fn lock_for(&self, version_id: VersionId) -> Arc<Mutex<()>> {
        self.locks
            .entry(version_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn get(&self, version_id: VersionId) -> Result<ResultRecord> {
        match self.results.get(&version_id) {
            Some(record) if !record.deleted => Ok(record.clone()),
            _ => Err(Error::ResultNotFound(version_id)),
        }
    }

    async fn save(&self, record: ResultRecord) -> Result<()> {
        if !self.results.contains_key(&record.version_id) {
            return Err(Error::ResultNotFound(record.version_id));
        }
        self.results.insert(record.version_id, record);
        Ok(())
    }

    async fn soft_delete(&self, version_id: VersionId) -> Result<()> {
        match self.results.get_mut(&version_id) {
            Some(mut record) => {
                record.deleted = true;
                record.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(Error::ResultNotFound(version_id)),
        }
    }

    async fn upsert_locked(&self, version_id: VersionId, build: UpsertFn) -> Result<ResultRecord> {
        let lock = self.lock_for(version_id);
        let _guard = lock.lock().await;

        let existing = self
            .results
            .get(&version_id)
            .filter(|record| !record.deleted)
            .map(|record| record.value().clone());

        let record = build(existing);
        if record.version_id != version_id {
            return Err(Error::Internal(format!(
                "Upsert produced a row for {} under key {}",
                record.version_id, version_id
            )));
        }
        self.results.insert(version_id, record.clone());
        Ok(record)
    }
}

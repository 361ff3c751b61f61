//! Search index client
//!
//! Removes a (model, version) pair from the secondary search index when the
//! version is deleted. The call is idempotent and best-effort: the engine
//! logs a failure and carries on, so the index may transiently lag behind
//! the primary store.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use common::error::{Error, Result};
use common::ids::{ModelId, VersionId};
use config::ConfigManager;

/// Secondary search index interface
#[async_trait]
pub trait SearchIndexService: Send + Sync {
    /// Removes the index entry for a deleted version
    async fn remove(&self, model_id: ModelId, version_id: VersionId) -> Result<()>;
}

/// HTTP implementation of [`SearchIndexService`]
pub struct HttpSearchIndexClient {
    /// HTTP client with bounded timeouts
    client: Client,
    /// Search index base URL
    base_url: String,
}

impl HttpSearchIndexClient {
    /// Creates a search index client from configuration
    pub fn new(config: &ConfigManager) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(config)?,
            base_url: crate::base_url(config, "search_index_url")?,
        })
    }
}

#[async_trait]
impl SearchIndexService for HttpSearchIndexClient {
    async fn remove(&self, model_id: ModelId, version_id: VersionId) -> Result<()> {
        let url = format!(
            "{}/fast/v1/model/match/{}/{}",
            self.base_url, model_id, version_id
        );

        debug!("Removing search index entry at {}", url);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::SearchIndexUnavailable(e.to_string()))?;

        let status = response.status();
        // Deleting an entry that was never indexed is fine
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(Error::SearchIndexUnavailable(format!(
            "Search index returned HTTP {} for {}",
            status, url
        )))
    }
}

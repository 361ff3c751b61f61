//! Main integration module for Model Forge
//!
//! This module wires the configuration, stores, service clients, and the
//! version lifecycle engine together and exposes the resulting operations
//! as one facade.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use common::ids::{ModelId, UserId, VersionId};
use common::models::{Dataset, Model};
use config::ConfigManager;
use lifecycle_engine::{
    ResultSummary, ResultSummaryWithArtifacts, VersionDetail, VersionLifecycleEngine,
    VersionSummary,
};
use common::models::ModelVersion;
use service_clients::{HttpAnalysisClient, HttpSearchIndexClient, HttpTrainingClient};
use stores::{
    InMemoryModelStore, InMemoryResultStore, InMemoryVersionStore, ModelStore, VersionStore,
};

/// Model Forge service facade
pub struct ModelForge {
    /// Configuration manager
    config_manager: Arc<ConfigManager>,

    /// Model store, shared with the engine
    models: Arc<dyn ModelStore>,

    /// Version store, shared with the engine
    versions: Arc<dyn VersionStore>,

    /// Version lifecycle engine
    engine: Arc<VersionLifecycleEngine>,
}

impl ModelForge {
    /// Creates a Model Forge instance wired against the remote services
    pub fn new() -> Result<Self> {
        Self::init_logging()?;

        info!("Initializing Model Forge");

        let config_manager = Arc::new(ConfigManager::new()?);

        let models: Arc<dyn ModelStore> = Arc::new(InMemoryModelStore::new());
        let versions: Arc<dyn VersionStore> = Arc::new(InMemoryVersionStore::new());
        let results = Arc::new(InMemoryResultStore::new());

        let trainer = Arc::new(HttpTrainingClient::new(&config_manager)?);
        let analyzer = Arc::new(HttpAnalysisClient::new(&config_manager)?);
        let search_index = Arc::new(HttpSearchIndexClient::new(&config_manager)?);

        let engine = Arc::new(VersionLifecycleEngine::new(
            models.clone(),
            versions.clone(),
            results,
            trainer,
            analyzer,
            search_index,
        ));

        Ok(Self {
            config_manager,
            models,
            versions,
            engine,
        })
    }

    /// Initializes logging
    fn init_logging() -> Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt().with_env_filter(filter).with_target(true).init();

        Ok(())
    }

    /// Registers a new model together with its first draft version
    pub async fn create_model(
        &self,
        name: impl Into<String>,
        owner: UserId,
        dataset: Dataset,
        initial_layers: &serde_json::Value,
    ) -> Result<(Model, VersionSummary)> {
        // Validate and normalize through the codec before any write
        let parsed = layer_codec::deserialize(initial_layers)?;
        let layers = layer_codec::serialize(&parsed)?;

        let model = Model::new(name, owner, dataset);
        self.models.insert(model.clone()).await?;

        let draft = ModelVersion::draft(model.id, layers);
        let summary = VersionSummary::from(&draft);
        self.versions.insert(draft).await?;

        info!("Created model {} ({})", model.id, model.name);
        Ok((model, summary))
    }

    /// Loads a model
    pub async fn get_model(&self, model_id: ModelId) -> Result<Model> {
        Ok(self.models.get(model_id).await?)
    }

    /// Creates a new draft version cloned from an existing one
    pub async fn create_version(
        &self,
        model_id: ModelId,
        source_version_id: VersionId,
        caller: UserId,
    ) -> Result<VersionSummary> {
        Ok(self
            .engine
            .create_version(model_id, source_version_id, caller)
            .await?)
    }

    /// Overwrites a version's layer spec
    pub async fn update_version(
        &self,
        version_id: VersionId,
        layers: &serde_json::Value,
        caller: UserId,
    ) -> Result<()> {
        Ok(self.engine.update_version(version_id, layers, caller).await?)
    }

    /// Soft-deletes a version and reconciles the model aggregate
    pub async fn delete_version(&self, version_id: VersionId, caller: UserId) -> Result<()> {
        Ok(self.engine.delete_version(version_id, caller).await?)
    }

    /// Trains a version on the remote trainer and stores the result
    pub async fn run_training(&self, version_id: VersionId) -> Result<ResultSummary> {
        Ok(self.engine.run_training(version_id).await?)
    }

    /// Fetches analysis artifacts and finalizes the version
    pub async fn save_analysis(&self, version_id: VersionId) -> Result<ResultSummaryWithArtifacts> {
        Ok(self.engine.save_analysis(version_id).await?)
    }

    /// Detail view of a version
    pub async fn get_version_detail(&self, version_id: VersionId) -> Result<VersionDetail> {
        Ok(self.engine.get_version_detail(version_id).await?)
    }

    /// The caller's in-progress versions
    pub async fn list_working_versions(&self, caller: UserId) -> Result<Vec<VersionSummary>> {
        Ok(self.engine.list_working_versions(caller).await?)
    }

    /// Gets the lifecycle engine
    pub fn get_engine(&self) -> Arc<VersionLifecycleEngine> {
        self.engine.clone()
    }

    /// Gets the configuration manager
    pub fn get_config_manager(&self) -> Arc<ConfigManager> {
        self.config_manager.clone()
    }
}

//! Version lifecycle engine
//!
//! The orchestrator of the model version state machine: version creation,
//! editing, deletion, training-result ingestion, analysis ingestion, and
//! aggregate reconciliation. Each operation loads entities through the
//! stores, enforces ownership and state invariants, optionally calls the
//! external services, and writes back through the stores. The commit point
//! is always after the external call that produced the data being written.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use common::error::{Error, Result};
use common::ids::{ModelId, UserId, VersionId};
use common::models::{Model, ModelVersion, ResultRecord, NO_ACCURACY, NO_LATEST_VERSION};
use service_clients::{AnalysisService, SearchIndexService, TrainingService};
use stores::{ModelStore, ResultStore, VersionStore};

use crate::summary::{ResultSummary, ResultSummaryWithArtifacts, VersionDetail, VersionSummary};

/// Orchestrates the model version lifecycle and keeps the aggregate consistent
pub struct VersionLifecycleEngine {
    /// Model aggregate store
    models: Arc<dyn ModelStore>,
    /// Version store
    versions: Arc<dyn VersionStore>,
    /// Result store
    results: Arc<dyn ResultStore>,
    /// Remote trainer
    trainer: Arc<dyn TrainingService>,
    /// Remote analyzer
    analyzer: Arc<dyn AnalysisService>,
    /// Secondary search index
    search_index: Arc<dyn SearchIndexService>,
}

impl VersionLifecycleEngine {
    /// Creates an engine over the given stores and service clients
    pub fn new(
        models: Arc<dyn ModelStore>,
        versions: Arc<dyn VersionStore>,
        results: Arc<dyn ResultStore>,
        trainer: Arc<dyn TrainingService>,
        analyzer: Arc<dyn AnalysisService>,
        search_index: Arc<dyn SearchIndexService>,
    ) -> Self {
        Self {
            models,
            versions,
            results,
            trainer,
            analyzer,
            search_index,
        }
    }

    /// Creates a new draft version cloned from an existing version's layers
    pub async fn create_version(
        &self,
        model_id: ModelId,
        source_version_id: VersionId,
        caller: UserId,
    ) -> Result<VersionSummary> {
        let model = self.models.get(model_id).await?;
        ensure_owner(&model, caller, "create a version")?;

        let source = self.versions.get(source_version_id).await?;
        // A draft must never be seeded from another model's layers
        if source.model_id != model_id {
            return Err(Error::VersionNotFound(source_version_id));
        }

        let draft = ModelVersion::draft(model_id, source.layers.clone());
        let summary = VersionSummary::from(&draft);
        self.versions.insert(draft).await?;

        info!(
            "Created draft version {} for model {}",
            summary.version_id, model_id
        );
        Ok(summary)
    }

    /// Overwrites a version's layer spec; a structural edit invalidates any
    /// previously computed result
    pub async fn update_version(
        &self,
        version_id: VersionId,
        new_layers: &Value,
        caller: UserId,
    ) -> Result<()> {
        let mut version = self.versions.get(version_id).await?;
        let model = self.models.get(version.model_id).await?;
        ensure_owner(&model, caller, "edit a version")?;

        // Validate and normalize through the codec before any write
        let parsed = layer_codec::deserialize(new_layers)?;
        version.layers = layer_codec::serialize(&parsed)?;
        version.touch();
        self.versions.save(version).await?;

        if self.results.get(version_id).await.is_ok() {
            self.results.soft_delete(version_id).await?;
            debug!(
                "Structural edit invalidated the result of version {}",
                version_id
            );
        }

        Ok(())
    }

    /// Soft-deletes a version and reconciles the model aggregate
    ///
    /// The search index removal is best-effort: its failure is logged and
    /// never aborts the deletion.
    pub async fn delete_version(&self, version_id: VersionId, caller: UserId) -> Result<()> {
        let version = self.versions.get(version_id).await?;
        let mut model = self.models.get(version.model_id).await?;
        ensure_owner(&model, caller, "delete a version")?;

        self.versions.soft_delete(version_id).await?;

        match self.search_index.remove(model.id, version_id).await {
            Ok(()) => info!(
                "Search index entry removed for model {} version {}",
                model.id, version_id
            ),
            Err(e) => error!(
                "Search index removal failed for model {} version {}: {}",
                model.id, version_id, e
            ),
        }

        if self.results.get(version_id).await.is_ok() {
            self.results.soft_delete(version_id).await?;
        }

        // An unfinalized model has nothing to reconcile
        if model.latest_version != NO_LATEST_VERSION {
            self.reconcile_aggregate(&mut model).await?;
            model.touch();
            self.models.save(model).await?;
        }

        info!("Deleted version {}", version_id);
        Ok(())
    }

    /// Points the aggregate at the highest surviving finalized, measured
    /// version, or resets it when none remains
    async fn reconcile_aggregate(&self, model: &mut Model) -> Result<()> {
        let mut survivors = self.versions.list_by_model(model.id).await;
        survivors.sort_by(|a, b| b.version_no.cmp(&a.version_no));

        let mut fallback = None;
        for survivor in survivors.iter().filter(|v| !v.is_draft()) {
            if let Ok(result) = self.results.get(survivor.id).await {
                fallback = Some((survivor.version_no, result.test_accuracy));
                break;
            }
        }

        match fallback {
            Some((version_no, accuracy)) => {
                model.latest_version = version_no;
                model.accuracy = accuracy;
                debug!(
                    "Model {} reconciled to version {} (accuracy {})",
                    model.id, version_no, accuracy
                );
            }
            None => {
                model.latest_version = NO_LATEST_VERSION;
                model.accuracy = NO_ACCURACY;
                debug!("Model {} has no measured version left", model.id);
            }
        }
        Ok(())
    }

    /// Trains a version and ingests the result under the per-version lock
    ///
    /// No result row is written when the trainer fails; the model aggregate
    /// is never touched here.
    pub async fn run_training(&self, version_id: VersionId) -> Result<ResultSummary> {
        let version = self.versions.get(version_id).await?;
        let model = self.models.get(version.model_id).await?;

        // Surface a corrupt stored spec before calling out
        layer_codec::deserialize(&version.layers)?;

        let outcome = self
            .trainer
            .train(model.id, version_id, &version.layers, &model.dataset)
            .await?;
        let total_params: u64 = outcome.layer_parameters.iter().sum();

        let record = self
            .results
            .upsert_locked(
                version_id,
                Box::new(move |existing| match existing {
                    Some(mut record) => {
                        record.update_training(
                            outcome.model_code,
                            outcome.final_test_accuracy,
                            outcome.final_test_loss,
                            outcome.train_info,
                            outcome.layer_parameters,
                            total_params,
                        );
                        record
                    }
                    None => ResultRecord::from_training(
                        version_id,
                        outcome.model_code,
                        outcome.final_test_accuracy,
                        outcome.final_test_loss,
                        outcome.train_info,
                        outcome.layer_parameters,
                        total_params,
                    ),
                }),
            )
            .await?;

        info!(
            "Training ingested for version {} (accuracy {})",
            version_id, record.test_accuracy
        );
        Ok(ResultSummary::from(&record))
    }

    /// Fetches analysis artifacts for a trained version and finalizes it
    pub async fn save_analysis(&self, version_id: VersionId) -> Result<ResultSummaryWithArtifacts> {
        let mut version = self.versions.get(version_id).await?;
        let mut model = self.models.get(version.model_id).await?;
        let mut record = self.results.get(version_id).await?;

        let artifacts = self
            .analyzer
            .analyze(model.id, version_id, model.dataset.name())
            .await?;
        record.set_artifacts(
            artifacts.confusion_matrix,
            artifacts.example_image,
            artifacts.feature_activation,
            artifacts.activation_maximization,
        );
        self.results.save(record.clone()).await?;

        let latest = model.latest_version;
        let accuracy = record.test_accuracy;

        if latest == NO_LATEST_VERSION {
            // First-ever finalize for this model
            version.version_no = 1;
            model.latest_version = 1;
            model.accuracy = accuracy;
        } else if version.version_no == latest {
            // Re-run of the current latest: accuracy refresh only
            model.accuracy = accuracy;
        } else if version.is_draft() {
            // Draft finalized while the model already has a latest
            version.version_no = latest + 1;
            model.latest_version = latest + 1;
            model.accuracy = accuracy;
        }
        // An older finalized version re-analyzed leaves the aggregate untouched

        version.is_working_on = false;
        version.touch();
        model.touch();
        self.versions.save(version.clone()).await?;
        self.models.save(model).await?;

        info!(
            "Version {} finalized as v{} (accuracy {})",
            version_id, version.version_no, accuracy
        );
        Ok(ResultSummaryWithArtifacts::from(&record))
    }

    /// Detail view of one version, with its result when training has run
    pub async fn get_version_detail(&self, version_id: VersionId) -> Result<VersionDetail> {
        let version = self.versions.get(version_id).await?;
        let result = self
            .results
            .get(version_id)
            .await
            .ok()
            .map(|record| ResultSummaryWithArtifacts::from(&record));

        Ok(VersionDetail {
            version: VersionSummary::from(&version),
            layers: version.layers,
            result,
        })
    }

    /// The caller's in-progress versions, across all of their models
    pub async fn list_working_versions(&self, caller: UserId) -> Result<Vec<VersionSummary>> {
        let mut working = Vec::new();
        for version in self.versions.list_working().await {
            match self.models.get(version.model_id).await {
                Ok(model) if model.owner == caller => working.push(VersionSummary::from(&version)),
                _ => {}
            }
        }
        Ok(working)
    }
}

/// Rejects callers other than the model owner
fn ensure_owner(model: &Model, caller: UserId, action: &str) -> Result<()> {
    if model.owner != caller {
        return Err(Error::Forbidden(format!(
            "Only the owner of model {} may {}",
            model.id, action
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use common::models::Dataset;
    use service_clients::{AnalysisArtifacts, TrainingOutcome};
    use stores::{InMemoryModelStore, InMemoryResultStore, InMemoryVersionStore};

    /// Trainer that replays a scripted accuracy per call
    struct ScriptedTrainer {
        accuracies: Vec<f64>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedTrainer {
        fn returning(accuracies: &[f64]) -> Self {
            Self {
                accuracies: accuracies.to_vec(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                accuracies: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl TrainingService for ScriptedTrainer {
        async fn train(
            &self,
            _model_id: ModelId,
            _version_id: VersionId,
            _layers: &Value,
            _dataset: &Dataset,
        ) -> Result<TrainingOutcome> {
            if self.fail {
                return Err(Error::TrainingServiceUnavailable(
                    "connection refused".to_string(),
                ));
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let accuracy = self.accuracies[call.min(self.accuracies.len() - 1)];
            // Yield so concurrent callers interleave
            tokio::task::yield_now().await;
            Ok(TrainingOutcome {
                final_test_accuracy: accuracy,
                final_test_loss: 1.0 - accuracy,
                model_code: format!("# acc {}", accuracy),
                layer_parameters: vec![320, 650],
                train_info: serde_json::json!({"train_result_per_epoch": []}),
            })
        }
    }

    /// Analyzer that records the dataset names it was asked about
    struct RecordingAnalyzer {
        requested: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingAnalyzer {
        fn new() -> Self {
            Self {
                requested: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                requested: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl AnalysisService for RecordingAnalyzer {
        async fn analyze(
            &self,
            _model_id: ModelId,
            _version_id: VersionId,
            dataset_name: &str,
        ) -> Result<AnalysisArtifacts> {
            if self.fail {
                return Err(Error::AnalysisServiceUnavailable(
                    "timed out".to_string(),
                ));
            }
            self.requested
                .lock()
                .unwrap()
                .push(dataset_name.to_string());
            Ok(AnalysisArtifacts {
                confusion_matrix: Some("cm".to_string()),
                example_image: Some("img".to_string()),
                feature_activation: Some("fa".to_string()),
                activation_maximization: None,
            })
        }
    }

    /// Search index that counts removals and optionally fails every call
    struct FlakySearchIndex {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FlakySearchIndex {
        fn healthy() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl SearchIndexService for FlakySearchIndex {
        async fn remove(&self, _model_id: ModelId, _version_id: VersionId) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::SearchIndexUnavailable("503".to_string()));
            }
            Ok(())
        }
    }

    struct Harness {
        engine: VersionLifecycleEngine,
        models: Arc<InMemoryModelStore>,
        versions: Arc<InMemoryVersionStore>,
        results: Arc<InMemoryResultStore>,
        analyzer: Arc<RecordingAnalyzer>,
        search_index: Arc<FlakySearchIndex>,
        owner: UserId,
    }

    fn harness(
        trainer: ScriptedTrainer,
        analyzer: RecordingAnalyzer,
        search_index: FlakySearchIndex,
    ) -> Harness {
        let models = Arc::new(InMemoryModelStore::new());
        let versions = Arc::new(InMemoryVersionStore::new());
        let results = Arc::new(InMemoryResultStore::new());
        let analyzer = Arc::new(analyzer);
        let search_index = Arc::new(search_index);
        let engine = VersionLifecycleEngine::new(
            models.clone(),
            versions.clone(),
            results.clone(),
            Arc::new(trainer),
            analyzer.clone(),
            search_index.clone(),
        );
        Harness {
            engine,
            models,
            versions,
            results,
            analyzer,
            search_index,
            owner: UserId::new(),
        }
    }

    fn sample_layers() -> Value {
        serde_json::json!([
            { "type": "Conv2d", "in_channels": 1, "out_channels": 32, "kernel_size": 3 },
            { "type": "ReLU" },
            { "type": "Flatten" },
            { "type": "Linear", "in_features": 21632, "out_features": 10 },
        ])
    }

    impl Harness {
        async fn seed_model(&self, dataset: Dataset) -> Model {
            let model = Model::new("cnn-1", self.owner, dataset);
            self.models.insert(model.clone()).await.unwrap();
            model
        }

        async fn seed_draft(&self, model_id: ModelId) -> ModelVersion {
            let draft = ModelVersion::draft(model_id, sample_layers());
            self.versions.insert(draft.clone()).await.unwrap();
            draft
        }

        /// Drives a draft through training and analysis
        async fn finalize(&self, version_id: VersionId) {
            self.engine.run_training(version_id).await.unwrap();
            self.engine.save_analysis(version_id).await.unwrap();
        }

        async fn assert_consistent(&self, model_id: ModelId) {
            let model = self.models.get(model_id).await.unwrap();
            assert!(
                model.aggregate_consistent(),
                "aggregate invariant broken: latest={} accuracy={}",
                model.latest_version,
                model.accuracy
            );
        }
    }

    #[tokio::test]
    async fn create_version_clones_source_layers() {
        let h = harness(
            ScriptedTrainer::returning(&[0.9]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let source = h.seed_draft(model.id).await;

        let summary = h
            .engine
            .create_version(model.id, source.id, h.owner)
            .await
            .unwrap();

        assert_eq!(summary.version_no, 0);
        assert!(summary.is_working_on);
        let created = h.versions.get(summary.version_id).await.unwrap();
        assert_eq!(created.layers, source.layers);
        // No change to the aggregate
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, NO_LATEST_VERSION);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn create_version_rejects_foreign_source() {
        let h = harness(
            ScriptedTrainer::returning(&[0.9]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let other = Model::new("cnn-2", h.owner, Dataset::Mnist);
        h.models.insert(other.clone()).await.unwrap();
        let foreign = h.seed_draft(other.id).await;

        let err = h
            .engine
            .create_version(model.id, foreign.id, h.owner)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn non_owner_is_forbidden_on_every_mutation() {
        let h = harness(
            ScriptedTrainer::returning(&[0.9]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;
        let stranger = UserId::new();

        let err = h
            .engine
            .create_version(model.id, draft.id, stranger)
            .await
            .unwrap_err();
        assert!(err.is_forbidden());

        let err = h
            .engine
            .update_version(draft.id, &sample_layers(), stranger)
            .await
            .unwrap_err();
        assert!(err.is_forbidden());

        let err = h.engine.delete_version(draft.id, stranger).await.unwrap_err();
        assert!(err.is_forbidden());

        // Nothing was written
        assert!(h.versions.get(draft.id).await.is_ok());
    }

    #[tokio::test]
    async fn update_version_invalidates_the_result() {
        let h = harness(
            ScriptedTrainer::returning(&[0.9]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;
        h.engine.run_training(draft.id).await.unwrap();
        assert!(h.results.get(draft.id).await.is_ok());

        let new_layers = serde_json::json!([{ "type": "ReLU" }]);
        h.engine
            .update_version(draft.id, &new_layers, h.owner)
            .await
            .unwrap();

        let updated = h.versions.get(draft.id).await.unwrap();
        assert_eq!(updated.layers, new_layers);
        assert_eq!(updated.version_no, 0);
        assert!(updated.is_working_on);
        // Structural edit invalidated the result
        assert!(h.results.get(draft.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_version_rejects_malformed_layers_before_writing() {
        let h = harness(
            ScriptedTrainer::returning(&[0.9]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;
        h.engine.run_training(draft.id).await.unwrap();

        let bad = serde_json::json!([{ "type": "HyperConv9d" }]);
        let err = h
            .engine
            .update_version(draft.id, &bad, h.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedLayerSpec(_)));

        // Neither the layers nor the result were touched
        let unchanged = h.versions.get(draft.id).await.unwrap();
        assert_eq!(unchanged.layers, sample_layers());
        assert!(h.results.get(draft.id).await.is_ok());
    }

    #[tokio::test]
    async fn first_finalize_assigns_version_one() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;

        let summary = h.engine.run_training(draft.id).await.unwrap();
        assert_eq!(summary.test_accuracy, 0.91);
        assert_eq!(summary.total_params, 970);

        let with_artifacts = h.engine.save_analysis(draft.id).await.unwrap();
        assert_eq!(with_artifacts.confusion_matrix.as_deref(), Some("cm"));

        let version = h.versions.get(draft.id).await.unwrap();
        assert_eq!(version.version_no, 1);
        assert!(!version.is_working_on);

        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, 1);
        assert_eq!(reloaded.accuracy, 0.91);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn draft_finalize_increments_latest() {
        let h = harness(
            ScriptedTrainer::returning(&[0.70, 0.80, 0.95]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let v1 = h.seed_draft(model.id).await;
        h.finalize(v1.id).await;
        let v2 = h
            .engine
            .create_version(model.id, v1.id, h.owner)
            .await
            .unwrap();
        h.finalize(v2.version_id).await;

        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, 2);
        assert_eq!(reloaded.accuracy, 0.80);

        // New draft trained to 0.95 becomes version 3
        let v3 = h
            .engine
            .create_version(model.id, v2.version_id, h.owner)
            .await
            .unwrap();
        h.finalize(v3.version_id).await;

        let version3 = h.versions.get(v3.version_id).await.unwrap();
        assert_eq!(version3.version_no, 3);
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, 3);
        assert_eq!(reloaded.accuracy, 0.95);
        // Old version 2 untouched
        let version2 = h.versions.get(v2.version_id).await.unwrap();
        assert_eq!(version2.version_no, 2);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn rerun_of_current_latest_updates_accuracy_only() {
        let h = harness(
            ScriptedTrainer::returning(&[0.70, 0.88]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;
        h.finalize(draft.id).await;

        // Re-train and re-analyze the same (now latest) version
        h.finalize(draft.id).await;

        let version = h.versions.get(draft.id).await.unwrap();
        assert_eq!(version.version_no, 1);
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, 1);
        assert_eq!(reloaded.accuracy, 0.88);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn older_version_reanalysis_leaves_aggregate_untouched() {
        let h = harness(
            ScriptedTrainer::returning(&[0.70, 0.95, 0.99]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let v1 = h.seed_draft(model.id).await;
        h.finalize(v1.id).await;
        let v2 = h
            .engine
            .create_version(model.id, v1.id, h.owner)
            .await
            .unwrap();
        h.finalize(v2.version_id).await;

        // Version 1 is no longer the latest; re-train and re-analyze it
        h.finalize(v1.id).await;

        let version1 = h.versions.get(v1.id).await.unwrap();
        assert_eq!(version1.version_no, 1);
        assert!(!version1.is_working_on);
        // The aggregate still tracks version 2
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, 2);
        assert_eq!(reloaded.accuracy, 0.95);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn deleting_the_latest_falls_back_to_the_highest_measured() {
        let h = harness(
            ScriptedTrainer::returning(&[0.70, 0.80, 0.95]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let v1 = h.seed_draft(model.id).await;
        h.finalize(v1.id).await;
        let v2 = h
            .engine
            .create_version(model.id, v1.id, h.owner)
            .await
            .unwrap();
        h.finalize(v2.version_id).await;
        let v3 = h
            .engine
            .create_version(model.id, v2.version_id, h.owner)
            .await
            .unwrap();
        h.finalize(v3.version_id).await;

        h.engine.delete_version(v3.version_id, h.owner).await.unwrap();

        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, 2);
        assert_eq!(reloaded.accuracy, 0.80);
        // The deleted version and its result are gone
        assert!(h.versions.get(v3.version_id).await.unwrap_err().is_not_found());
        assert!(h.results.get(v3.version_id).await.unwrap_err().is_not_found());
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn deleting_the_only_finalized_version_resets_the_aggregate() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;
        h.finalize(draft.id).await;

        h.engine.delete_version(draft.id, h.owner).await.unwrap();

        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, NO_LATEST_VERSION);
        assert_eq!(reloaded.accuracy, NO_ACCURACY);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn trained_but_unanalyzed_draft_never_wins_reconciliation() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91, 0.77]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let v1 = h.seed_draft(model.id).await;
        h.finalize(v1.id).await;

        // Second draft trained but never analyzed: it has a result with a
        // measured accuracy while its version_no is still 0
        let draft = h
            .engine
            .create_version(model.id, v1.id, h.owner)
            .await
            .unwrap();
        h.engine.run_training(draft.version_id).await.unwrap();
        assert!(h.results.get(draft.version_id).await.is_ok());

        h.engine.delete_version(v1.id, h.owner).await.unwrap();

        // The measured draft must not become the canonical version; with no
        // finalized survivor the aggregate resets
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, NO_LATEST_VERSION);
        assert_eq!(reloaded.accuracy, NO_ACCURACY);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn deleting_an_unfinalized_draft_skips_reconciliation() {
        let h = harness(
            ScriptedTrainer::returning(&[0.9]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;

        h.engine.delete_version(draft.id, h.owner).await.unwrap();

        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, NO_LATEST_VERSION);
        assert_eq!(reloaded.accuracy, NO_ACCURACY);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn search_index_failure_does_not_abort_deletion() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::failing(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;
        h.finalize(draft.id).await;

        h.engine.delete_version(draft.id, h.owner).await.unwrap();

        assert_eq!(h.search_index.calls.load(Ordering::SeqCst), 1);
        assert!(h.versions.get(draft.id).await.unwrap_err().is_not_found());
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, NO_LATEST_VERSION);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn training_failure_writes_nothing() {
        let h = harness(
            ScriptedTrainer::failing(),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;

        let err = h.engine.run_training(draft.id).await.unwrap_err();
        assert!(err.is_external_service());

        assert!(h.results.get(draft.id).await.unwrap_err().is_not_found());
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, NO_LATEST_VERSION);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn analysis_failure_leaves_the_version_working() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::failing(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;
        h.engine.run_training(draft.id).await.unwrap();

        let err = h.engine.save_analysis(draft.id).await.unwrap_err();
        assert!(err.is_external_service());

        let version = h.versions.get(draft.id).await.unwrap();
        assert_eq!(version.version_no, 0);
        assert!(version.is_working_on);
        let record = h.results.get(draft.id).await.unwrap();
        assert_eq!(record.confusion_matrix, None);
        let reloaded = h.models.get(model.id).await.unwrap();
        assert_eq!(reloaded.latest_version, NO_LATEST_VERSION);
        h.assert_consistent(model.id).await;
    }

    #[tokio::test]
    async fn analysis_before_training_is_result_not_found() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;

        let err = h.engine.save_analysis(draft.id).await.unwrap_err();
        assert!(matches!(err, Error::ResultNotFound(_)));
    }

    #[tokio::test]
    async fn stored_dataset_name_is_passed_through_to_the_analyzer() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Fashion).await;
        let draft = h.seed_draft(model.id).await;
        h.finalize(draft.id).await;

        // The engine hands the catalog name over unchanged; the HTTP client
        // owns the Fashion_MNIST path rewrite
        let requested = h.analyzer.requested.lock().unwrap().clone();
        assert_eq!(requested, vec!["Fashion".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_training_runs_leave_one_coherent_result() {
        let h = harness(
            ScriptedTrainer::returning(&[0.70, 0.80]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;

        let (a, b) = tokio::join!(
            h.engine.run_training(draft.id),
            h.engine.run_training(draft.id)
        );
        a.unwrap();
        b.unwrap();

        let record = h.results.get(draft.id).await.unwrap();
        let coherent = (record.test_accuracy == 0.70 && record.code == "# acc 0.7")
            || (record.test_accuracy == 0.80 && record.code == "# acc 0.8");
        assert!(coherent, "result mixed fields from two training runs");
    }

    #[tokio::test]
    async fn version_detail_includes_the_result_once_trained() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let draft = h.seed_draft(model.id).await;

        let detail = h.engine.get_version_detail(draft.id).await.unwrap();
        assert!(detail.result.is_none());
        assert_eq!(detail.layers, sample_layers());

        h.finalize(draft.id).await;
        let detail = h.engine.get_version_detail(draft.id).await.unwrap();
        let result = detail.result.unwrap();
        assert_eq!(result.result.test_accuracy, 0.91);
        assert_eq!(result.confusion_matrix.as_deref(), Some("cm"));
    }

    #[tokio::test]
    async fn working_list_is_scoped_to_the_caller() {
        let h = harness(
            ScriptedTrainer::returning(&[0.91]),
            RecordingAnalyzer::new(),
            FlakySearchIndex::healthy(),
        );
        let model = h.seed_model(Dataset::Mnist).await;
        let mine = h.seed_draft(model.id).await;

        let other_owner = UserId::new();
        let other_model = Model::new("cnn-2", other_owner, Dataset::Mnist);
        h.models.insert(other_model.clone()).await.unwrap();
        h.seed_draft(other_model.id).await;

        let working = h.engine.list_working_versions(h.owner).await.unwrap();
        assert_eq!(working.len(), 1);
        assert_eq!(working[0].version_id, mine.id);

        // A finalized version drops out of the working list
        h.finalize(mine.id).await;
        assert!(h.engine.list_working_versions(h.owner).await.unwrap().is_empty());
    }
}

//! Plain data summaries returned by the lifecycle engine
//!
//! These are the programmatic surface a thin API layer wraps into
//! endpoints; no framework-specific response wrapping happens here.

use serde::Serialize;

use common::ids::{ModelId, VersionId};
use common::models::{ModelVersion, ResultRecord};

/// Summary of a model version
#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    /// Version identifier
    pub version_id: VersionId,
    /// Owning model
    pub model_id: ModelId,
    /// 0 while the version is a draft
    pub version_no: u32,
    /// True while the version is still being trained or edited
    pub is_working_on: bool,
}

impl From<&ModelVersion> for VersionSummary {
    fn from(version: &ModelVersion) -> Self {
        Self {
            version_id: version.id,
            model_id: version.model_id,
            version_no: version.version_no,
            is_working_on: version.is_working_on,
        }
    }
}

/// Training result summary, before analysis artifacts exist
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    /// Owning version
    pub version_id: VersionId,
    /// Generated model source code
    pub code: String,
    /// Final test accuracy
    pub test_accuracy: f64,
    /// Final test loss
    pub test_loss: f64,
    /// Per-layer parameter counts
    pub layer_params: Vec<u64>,
    /// Total parameter count
    pub total_params: u64,
}

impl From<&ResultRecord> for ResultSummary {
    fn from(record: &ResultRecord) -> Self {
        Self {
            version_id: record.version_id,
            code: record.code.clone(),
            test_accuracy: record.test_accuracy,
            test_loss: record.test_loss,
            layer_params: record.layer_params.clone(),
            total_params: record.total_params,
        }
    }
}

/// Training result summary including the four analysis artifacts
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummaryWithArtifacts {
    /// Training fields
    #[serde(flatten)]
    pub result: ResultSummary,
    /// Confusion matrix blob, if analyzed
    pub confusion_matrix: Option<String>,
    /// Example image blob, if analyzed
    pub example_image: Option<String>,
    /// Feature activation blob, if analyzed
    pub feature_activation: Option<String>,
    /// Activation maximization blob, if analyzed
    pub activation_maximization: Option<String>,
}

impl From<&ResultRecord> for ResultSummaryWithArtifacts {
    fn from(record: &ResultRecord) -> Self {
        Self {
            result: ResultSummary::from(record),
            confusion_matrix: record.confusion_matrix.clone(),
            example_image: record.example_image.clone(),
            feature_activation: record.feature_activation.clone(),
            activation_maximization: record.activation_maximization.clone(),
        }
    }
}

/// Full detail view of a version: summary, layer spec, optional result
#[derive(Debug, Clone, Serialize)]
pub struct VersionDetail {
    /// Version summary
    pub version: VersionSummary,
    /// Serialized layer spec
    pub layers: serde_json::Value,
    /// Attached result, when training has run
    pub result: Option<ResultSummaryWithArtifacts>,
}

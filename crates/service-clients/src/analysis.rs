//! Analysis service client
//!
//! Requests visualization artifacts for a trained version. The dataset
//! name embedded in the URL path follows the catalog's quirk: the literal
//! name `Fashion` is sent as `Fashion_MNIST`, every other name is
//! lower-cased. The stored dataset name is never rewritten.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use common::error::{Error, Result};
use common::ids::{ModelId, VersionId};
use config::ConfigManager;

/// Visualization artifacts produced by the analysis service
///
/// Each field is the serialized blob from the matching response field;
/// `None` means the service did not include it.
#[derive(Debug, Clone, Default)]
pub struct AnalysisArtifacts {
    /// Confusion matrix blob
    pub confusion_matrix: Option<String>,
    /// Example image blob
    pub example_image: Option<String>,
    /// Feature activation blob
    pub feature_activation: Option<String>,
    /// Activation maximization blob
    pub activation_maximization: Option<String>,
}

/// Remote analyzer interface
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Runs analysis for a trained version against the named dataset
    async fn analyze(
        &self,
        model_id: ModelId,
        version_id: VersionId,
        dataset_name: &str,
    ) -> Result<AnalysisArtifacts>;
}

/// HTTP implementation of [`AnalysisService`]
pub struct HttpAnalysisClient {
    /// HTTP client with bounded timeouts
    client: Client,
    /// Analyzer base URL
    base_url: String,
}

impl HttpAnalysisClient {
    /// Creates an analysis client from configuration
    pub fn new(config: &ConfigManager) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(config)?,
            base_url: crate::base_url(config, "analysis_service_url")?,
        })
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze(
        &self,
        model_id: ModelId,
        version_id: VersionId,
        dataset_name: &str,
    ) -> Result<AnalysisArtifacts> {
        let url = format!(
            "{}/fast/v1/model/test/analyze/{}/{}/{}",
            self.base_url,
            model_id,
            version_id,
            dataset_path_segment(dataset_name)
        );

        debug!("Requesting analysis from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::AnalysisServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AnalysisServiceUnavailable(format!(
                "Analyzer returned HTTP {} for {}",
                status, url
            )));
        }

        let root: Value = response
            .json()
            .await
            .map_err(|e| Error::AnalysisServiceUnavailable(format!("Malformed payload: {}", e)))?;

        Ok(parse_analysis_response(&root))
    }
}

/// Maps a catalog dataset name to the URL path segment the analyzer expects
pub fn dataset_path_segment(name: &str) -> String {
    if name == "Fashion" {
        "Fashion_MNIST".to_string()
    } else {
        name.to_lowercase()
    }
}

/// Extracts the four artifacts from the analyzer's response body
pub(crate) fn parse_analysis_response(root: &Value) -> AnalysisArtifacts {
    AnalysisArtifacts {
        confusion_matrix: artifact_field(root, "confusion_matrix"),
        example_image: artifact_field(root, "example_image"),
        feature_activation: artifact_field(root, "feature_activation"),
        activation_maximization: artifact_field(root, "activation_maximization"),
    }
}

/// Serializes one named response field; absent or null fields map to None
fn artifact_field(root: &Value, name: &str) -> Option<String> {
    match root.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fashion_is_rewritten_verbatim() {
        assert_eq!(dataset_path_segment("Fashion"), "Fashion_MNIST");
    }

    #[test]
    fn other_names_are_lower_cased() {
        assert_eq!(dataset_path_segment("MNIST"), "mnist");
        assert_eq!(dataset_path_segment("CIFAR10"), "cifar10");
        assert_eq!(dataset_path_segment("EMNIST"), "emnist");
    }

    #[test]
    fn rewrite_is_case_sensitive() {
        // Only the exact catalog spelling triggers the rewrite
        assert_eq!(dataset_path_segment("fashion"), "fashion");
        assert_eq!(dataset_path_segment("FASHION"), "fashion");
    }

    #[test]
    fn missing_fields_stay_absent() {
        let root = serde_json::json!({
            "confusion_matrix": [[9, 1], [0, 10]],
            "example_image": "base64...",
        });
        let artifacts = parse_analysis_response(&root);
        assert_eq!(artifacts.confusion_matrix.as_deref(), Some("[[9,1],[0,10]]"));
        assert_eq!(artifacts.example_image.as_deref(), Some("base64..."));
        assert_eq!(artifacts.feature_activation, None);
        assert_eq!(artifacts.activation_maximization, None);
    }

    #[test]
    fn null_fields_stay_absent() {
        let root = serde_json::json!({ "confusion_matrix": null });
        assert_eq!(parse_analysis_response(&root).confusion_matrix, None);
    }
}

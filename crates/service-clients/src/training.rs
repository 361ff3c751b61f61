//! Training service client
//!
//! Sends a (layer sequence, dataset descriptor) pair to the remote trainer
//! and parses the training/test metrics and generated source code out of
//! the nested `test_results.results` payload.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use common::error::{Error, Result};
use common::ids::{ModelId, VersionId};
use common::models::Dataset;
use config::ConfigManager;

/// Metrics and generated code returned by a completed training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Final test accuracy; 0.0 when the trainer omitted it
    pub final_test_accuracy: f64,
    /// Final test loss; 0.0 when the trainer omitted it
    pub final_test_loss: f64,
    /// Generated model source code
    pub model_code: String,
    /// Per-layer parameter counts
    pub layer_parameters: Vec<u64>,
    /// Aggregated training-history blob (per-epoch results + history)
    pub train_info: Value,
}

/// Remote trainer interface
#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Trains the given layer sequence against the dataset
    async fn train(
        &self,
        model_id: ModelId,
        version_id: VersionId,
        layers: &Value,
        dataset: &Dataset,
    ) -> Result<TrainingOutcome>;
}

/// HTTP implementation of [`TrainingService`]
pub struct HttpTrainingClient {
    /// HTTP client with bounded timeouts
    client: Client,
    /// Trainer base URL
    base_url: String,
}

impl HttpTrainingClient {
    /// Creates a training client from configuration
    pub fn new(config: &ConfigManager) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(config)?,
            base_url: crate::base_url(config, "training_service_url")?,
        })
    }
}

#[async_trait]
impl TrainingService for HttpTrainingClient {
    async fn train(
        &self,
        model_id: ModelId,
        version_id: VersionId,
        layers: &Value,
        dataset: &Dataset,
    ) -> Result<TrainingOutcome> {
        let url = format!(
            "{}/fast/v1/models/{}/versions/{}",
            self.base_url, model_id, version_id
        );
        let body = serde_json::json!({
            "layers": layers,
            "dataset": dataset.descriptor(),
        });

        debug!("Submitting training request to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::TrainingServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::TrainingServiceUnavailable(format!(
                "Trainer returned HTTP {} for {}",
                status, url
            )));
        }

        let root: Value = response
            .json()
            .await
            .map_err(|e| Error::TrainingServiceUnavailable(format!("Malformed payload: {}", e)))?;

        parse_training_response(&root)
    }
}

/// Extracts a [`TrainingOutcome`] from the trainer's response body
pub(crate) fn parse_training_response(root: &Value) -> Result<TrainingOutcome> {
    let results = &root["test_results"]["results"];
    if results.is_null() {
        return Err(Error::TrainingServiceUnavailable(
            "Response missing test_results.results".to_string(),
        ));
    }

    let final_test_accuracy = results["final_test_accuracy"].as_f64().unwrap_or(0.0);
    let final_test_loss = results["final_test_loss"].as_f64().unwrap_or(0.0);

    let model_code = results["model_code"]
        .as_str()
        .ok_or_else(|| {
            Error::TrainingServiceUnavailable("Response missing model_code".to_string())
        })?
        .to_string();

    let layer_parameters = results["layer_parameters"]
        .as_array()
        .ok_or_else(|| {
            Error::TrainingServiceUnavailable("Response missing layer_parameters".to_string())
        })?
        .iter()
        .map(|v| {
            v.as_u64().ok_or_else(|| {
                Error::TrainingServiceUnavailable(format!(
                    "Non-integer layer parameter count: {}",
                    v
                ))
            })
        })
        .collect::<Result<Vec<u64>>>()?;

    let train_info = serde_json::json!({
        "train_result_per_epoch": results["train_result_per_epoch"],
        "training_history": results["training_history"],
    });

    Ok(TrainingOutcome {
        final_test_accuracy,
        final_test_loss,
        model_code,
        layer_parameters,
        train_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trainer_response() -> Value {
        serde_json::json!({
            "test_results": {
                "results": {
                    "final_test_accuracy": 0.91,
                    "final_test_loss": 0.28,
                    "model_code": "class Net(nn.Module): ...",
                    "layer_parameters": [320, 0, 18496, 0, 650],
                    "train_result_per_epoch": [{"epoch": 1, "loss": 0.9}],
                    "training_history": {"lr": 0.001},
                }
            }
        })
    }

    #[test]
    fn parses_full_response() {
        let outcome = parse_training_response(&trainer_response()).unwrap();
        assert_eq!(outcome.final_test_accuracy, 0.91);
        assert_eq!(outcome.final_test_loss, 0.28);
        assert_eq!(outcome.layer_parameters, vec![320, 0, 18496, 0, 650]);
        assert_eq!(
            outcome.train_info["training_history"],
            serde_json::json!({"lr": 0.001})
        );
    }

    #[test]
    fn missing_metrics_default_to_zero() {
        let mut root = trainer_response();
        let results = &mut root["test_results"]["results"];
        results
            .as_object_mut()
            .unwrap()
            .remove("final_test_accuracy");
        results.as_object_mut().unwrap().remove("final_test_loss");

        let outcome = parse_training_response(&root).unwrap();
        assert_eq!(outcome.final_test_accuracy, 0.0);
        assert_eq!(outcome.final_test_loss, 0.0);
    }

    #[test]
    fn missing_results_is_a_service_error() {
        let err = parse_training_response(&serde_json::json!({"status": "ok"})).unwrap_err();
        assert!(matches!(err, Error::TrainingServiceUnavailable(_)));
    }

    #[test]
    fn missing_model_code_is_a_service_error() {
        let mut root = trainer_response();
        root["test_results"]["results"]
            .as_object_mut()
            .unwrap()
            .remove("model_code");
        let err = parse_training_response(&root).unwrap_err();
        assert!(matches!(err, Error::TrainingServiceUnavailable(_)));
    }
}

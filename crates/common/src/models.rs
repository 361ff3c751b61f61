//! Entity data model for model-forge
//!
//! This module defines the persistent entities: the model aggregate, its
//! versions, and the one-to-one training result attached to a version.
//! Derived aggregate state (`latest_version`, `accuracy`) is mutated only
//! by the lifecycle engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::ids::{ModelId, UserId, VersionId};

/// Sentinel stored in `Model::latest_version` while no version is finalized
pub const NO_LATEST_VERSION: u32 = 0;

/// Sentinel stored in `Model::accuracy` while no accuracy is available
pub const NO_ACCURACY: f64 = -1.0;

/// Dataset catalog the training and analysis services understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dataset {
    /// Handwritten digits
    Mnist,
    /// Fashion-MNIST clothing images
    Fashion,
    /// CIFAR-10 color images
    Cifar10,
    /// Street View House Numbers
    Svhn,
    /// Extended MNIST (balanced split)
    Emnist,
}

impl Dataset {
    /// Canonical catalog name, as stored and shown to users
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Mnist => "MNIST",
            Dataset::Fashion => "Fashion",
            Dataset::Cifar10 => "CIFAR10",
            Dataset::Svhn => "SVHN",
            Dataset::Emnist => "EMNIST",
        }
    }

    /// Number of training samples
    pub fn train_count(&self) -> u32 {
        match self {
            Dataset::Mnist | Dataset::Fashion => 60_000,
            Dataset::Cifar10 => 50_000,
            Dataset::Svhn => 73_257,
            Dataset::Emnist => 112_800,
        }
    }

    /// Number of test samples
    pub fn test_count(&self) -> u32 {
        match self {
            Dataset::Mnist | Dataset::Fashion | Dataset::Cifar10 => 10_000,
            Dataset::Svhn => 26_032,
            Dataset::Emnist => 18_800,
        }
    }

    /// Number of class labels
    pub fn label_count(&self) -> u32 {
        match self {
            Dataset::Emnist => 47,
            _ => 10,
        }
    }

    /// Wire descriptor embedded in the training request body
    pub fn descriptor(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "train_cnt": self.train_count(),
            "test_cnt": self.test_count(),
            "label_cnt": self.label_count(),
        })
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MNIST" => Ok(Dataset::Mnist),
            "Fashion" => Ok(Dataset::Fashion),
            "CIFAR10" => Ok(Dataset::Cifar10),
            "SVHN" => Ok(Dataset::Svhn),
            "EMNIST" => Ok(Dataset::Emnist),
            other => Err(Error::DatasetNotFound(other.to_string())),
        }
    }
}

/// Model aggregate root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Unique identifier
    pub id: ModelId,
    /// Display name
    pub name: String,
    /// Owning user; only the owner may mutate versions
    pub owner: UserId,
    /// Dataset the model is designed against
    pub dataset: Dataset,
    /// Version number currently considered canonical; 0 = none finalized
    pub latest_version: u32,
    /// Accuracy of the canonical version; -1.0 = no accuracy available
    pub accuracy: f64,
    /// Soft-delete flag
    pub deleted: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Creates a new model with no finalized version
    pub fn new(name: impl Into<String>, owner: UserId, dataset: Dataset) -> Self {
        let now = Utc::now();
        Self {
            id: ModelId::new(),
            name: name.into(),
            owner,
            dataset,
            latest_version: NO_LATEST_VERSION,
            accuracy: NO_ACCURACY,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refreshes the updated timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True while the aggregate invariant `latest == 0 ⇔ accuracy == -1.0` holds
    pub fn aggregate_consistent(&self) -> bool {
        (self.latest_version == NO_LATEST_VERSION) == (self.accuracy == NO_ACCURACY)
    }
}

/// A single version of a model's architecture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Unique identifier; also the key of the attached result, if any
    pub id: VersionId,
    /// Owning model; fixed for the version's lifetime
    pub model_id: ModelId,
    /// 0 = draft; positive numbers are assigned once, monotonically
    pub version_no: u32,
    /// Serialized layer spec
    pub layers: serde_json::Value,
    /// True while the version is still being trained or edited
    pub is_working_on: bool,
    /// Soft-delete flag
    pub deleted: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Creates a new draft version with the given layer spec
    pub fn draft(model_id: ModelId, layers: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: VersionId::new(),
            model_id,
            version_no: 0,
            layers,
            is_working_on: true,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refreshes the updated timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True while the version has never been finalized
    pub fn is_draft(&self) -> bool {
        self.version_no == 0
    }
}

/// Training (and later analysis) result for a version, keyed by the version id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Owning version; one result per version
    pub version_id: VersionId,
    /// Generated model source code
    pub code: String,
    /// Final test accuracy
    pub test_accuracy: f64,
    /// Final test loss
    pub test_loss: f64,
    /// Aggregated training history blob
    pub train_info: serde_json::Value,
    /// Per-layer parameter counts
    pub layer_params: Vec<u64>,
    /// Total parameter count, derived as the sum of `layer_params`
    pub total_params: u64,
    /// Confusion matrix artifact; populated by the analysis step
    pub confusion_matrix: Option<String>,
    /// Example image artifact; populated by the analysis step
    pub example_image: Option<String>,
    /// Feature activation artifact; populated by the analysis step
    pub feature_activation: Option<String>,
    /// Activation maximization artifact; populated by the analysis step
    pub activation_maximization: Option<String>,
    /// Soft-delete flag
    pub deleted: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Creates a fresh result from a completed training run
    pub fn from_training(
        version_id: VersionId,
        code: String,
        test_accuracy: f64,
        test_loss: f64,
        train_info: serde_json::Value,
        layer_params: Vec<u64>,
        total_params: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            version_id,
            code,
            test_accuracy,
            test_loss,
            train_info,
            layer_params,
            total_params,
            confusion_matrix: None,
            example_image: None,
            feature_activation: None,
            activation_maximization: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the training fields in place, keeping analysis artifacts
    pub fn update_training(
        &mut self,
        code: String,
        test_accuracy: f64,
        test_loss: f64,
        train_info: serde_json::Value,
        layer_params: Vec<u64>,
        total_params: u64,
    ) {
        self.code = code;
        self.test_accuracy = test_accuracy;
        self.test_loss = test_loss;
        self.train_info = train_info;
        self.layer_params = layer_params;
        self.total_params = total_params;
        self.updated_at = Utc::now();
    }

    /// Merges the four analysis artifacts into the record
    pub fn set_artifacts(
        &mut self,
        confusion_matrix: Option<String>,
        example_image: Option<String>,
        feature_activation: Option<String>,
        activation_maximization: Option<String>,
    ) {
        self.confusion_matrix = confusion_matrix;
        self.example_image = example_image;
        self.feature_activation = feature_activation;
        self.activation_maximization = activation_maximization;
        self.updated_at = Utc::now();
    }
}

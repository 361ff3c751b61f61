//! Error types for the common crate
//!
//! This module defines the error taxonomy shared by every crate in the
//! model-forge workspace.

use thiserror::Error;

use crate::ids::{ModelId, VersionId};

/// Result type for model-forge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for model-forge operations
#[derive(Error, Debug)]
pub enum Error {
    /// Model absent or soft-deleted
    #[error("Model not found: {0}")]
    ModelNotFound(ModelId),

    /// Model version absent or soft-deleted
    #[error("Model version not found: {0}")]
    VersionNotFound(VersionId),

    /// Training has not produced a result for this version yet
    #[error("Result not found for version: {0}")]
    ResultNotFound(VersionId),

    /// Dataset name is not part of the catalog
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Caller is not the owner of the model
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Layer spec failed to decode
    #[error("Malformed layer spec: {0}")]
    MalformedLayerSpec(String),

    /// Training service call failed (network, non-2xx, bad payload, timeout)
    #[error("Training service unavailable: {0}")]
    TrainingServiceUnavailable(String),

    /// Analysis service call failed (network, non-2xx, bad payload, timeout)
    #[error("Analysis service unavailable: {0}")]
    AnalysisServiceUnavailable(String),

    /// Search index call failed; callers may tolerate this one
    #[error("Search index unavailable: {0}")]
    SearchIndexUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error is a not-found class error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ModelNotFound(_)
                | Error::VersionNotFound(_)
                | Error::ResultNotFound(_)
                | Error::DatasetNotFound(_)
        )
    }

    /// Returns true if the error is a forbidden error
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden(_))
    }

    /// Returns true if the error came from an external service
    pub fn is_external_service(&self) -> bool {
        matches!(
            self,
            Error::TrainingServiceUnavailable(_)
                | Error::AnalysisServiceUnavailable(_)
                | Error::SearchIndexUnavailable(_)
        )
    }
}

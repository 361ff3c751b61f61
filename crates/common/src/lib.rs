//! Common utilities and types for model-forge
//!
//! This crate defines the error taxonomy, entity identifiers, and the
//! persistent data model shared by every crate in the workspace.

pub mod error;
pub mod ids;
pub mod models;

// Re-export commonly used types
pub use error::{Error, Result};
pub use ids::{ModelId, UserId, VersionId};
pub use models::{Dataset, Model, ModelVersion, ResultRecord, NO_ACCURACY, NO_LATEST_VERSION};

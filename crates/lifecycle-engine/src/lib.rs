//! Version lifecycle engine for model-forge
//!
//! Coordinates the stores and the external service clients to move model
//! versions through their lifecycle while keeping each model's best-known
//! aggregate (latest version number and its accuracy) consistent.

pub mod engine;
pub mod summary;

// Re-export commonly used types
pub use engine::VersionLifecycleEngine;
pub use summary::{ResultSummary, ResultSummaryWithArtifacts, VersionDetail, VersionSummary};

//! External service clients for model-forge
//!
//! This crate defines the traits the lifecycle engine talks to (training,
//! analysis, and the search index) together with their HTTP
//! implementations. Clients are pure I/O adapters: failures propagate as
//! the corresponding service error and are never retried here.

pub mod analysis;
pub mod search_index;
pub mod training;

use reqwest::Client;

use common::error::{Error, Result};
use config::ConfigManager;

// Re-export commonly used types
pub use analysis::{AnalysisArtifacts, AnalysisService, HttpAnalysisClient};
pub use search_index::{HttpSearchIndexClient, SearchIndexService};
pub use training::{HttpTrainingClient, TrainingOutcome, TrainingService};

/// Builds the shared HTTP client with bounded timeouts from configuration
pub(crate) fn http_client(config: &ConfigManager) -> Result<Client> {
    let request_timeout = config.get_duration("request_timeout_secs")?;
    let connect_timeout = config.get_duration("connect_timeout_secs")?;

    Client::builder()
        .user_agent("model-forge/0.1.0")
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Reads a service base URL from configuration, trimming a trailing slash
pub(crate) fn base_url(config: &ConfigManager, key: &str) -> Result<String> {
    let url = config.get_str(key)?;
    Ok(url.trim_end_matches('/').to_string())
}

//! Persistence stores for model-forge
//!
//! This crate defines the store contracts the lifecycle engine writes
//! through, plus in-memory arena implementations keyed by opaque id.
//! Every traversal between entities is an explicit store call; the
//! not-deleted predicate is applied uniformly inside each query method,
//! never at call sites.

pub mod model_store;
pub mod result_store;
pub mod version_store;

// Re-export commonly used types
pub use model_store::{InMemoryModelStore, ModelStore};
pub use result_store::{InMemoryResultStore, ResultStore, UpsertFn};
pub use version_store::{InMemoryVersionStore, VersionStore};

//! Configuration management for model-forge
//!
//! This crate provides functionality for managing configuration settings,
//! with support for defaults, a JSON config file, and environment overrides.

pub mod manager;

// Re-export commonly used types
pub use manager::ConfigManager;

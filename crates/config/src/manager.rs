//! Configuration manager
//!
//! Settings are resolved from three layers: built-in defaults, an optional
//! JSON config file (path in `MODEL_FORGE_CONFIG`), and `MODEL_FORGE_*`
//! environment variable overrides. Later layers win.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use common::error::{Error, Result};

/// Environment variable naming the optional JSON config file
const CONFIG_FILE_ENV: &str = "MODEL_FORGE_CONFIG";

/// Prefix of per-key environment overrides, e.g. MODEL_FORGE_TRAINING_SERVICE_URL
const ENV_PREFIX: &str = "MODEL_FORGE_";

/// Configuration manager for model-forge
pub struct ConfigManager {
    /// Resolved settings
    values: RwLock<HashMap<String, Value>>,
}

impl ConfigManager {
    /// Creates a configuration manager from defaults, file, and environment
    pub fn new() -> Result<Self> {
        let mut values = Self::defaults();

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read {}: {}", path, e)))?;
            let file: HashMap<String, Value> = serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path, e)))?;
            debug!("Loaded {} settings from {}", file.len(), path);
            values.extend(file);
        }

        for (key, value) in std::env::vars() {
            if key == CONFIG_FILE_ENV {
                continue;
            }
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                let name = name.to_lowercase();
                if !values.contains_key(&name) {
                    warn!("Ignoring unknown configuration override: {}", key);
                    continue;
                }
                // Numeric and boolean overrides parse as JSON, everything else as a string
                let parsed = serde_json::from_str(&value).unwrap_or(Value::String(value));
                values.insert(name, parsed);
            }
        }

        Ok(Self {
            values: RwLock::new(values),
        })
    }

    /// Built-in defaults
    fn defaults() -> HashMap<String, Value> {
        let mut defaults = HashMap::new();
        defaults.insert(
            "training_service_url".to_string(),
            Value::String("http://localhost:8002".to_string()),
        );
        defaults.insert(
            "analysis_service_url".to_string(),
            Value::String("http://localhost:8003".to_string()),
        );
        defaults.insert(
            "search_index_url".to_string(),
            Value::String("http://localhost:8001".to_string()),
        );
        defaults.insert("request_timeout_secs".to_string(), Value::from(300u64));
        defaults.insert("connect_timeout_secs".to_string(), Value::from(10u64));
        defaults
    }

    /// Gets a string setting
    pub fn get_str(&self, key: &str) -> Result<String> {
        let values = self.values.read();
        match values.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(Error::Config(format!("Unknown setting: {}", key))),
        }
    }

    /// Gets an unsigned integer setting
    pub fn get_u64(&self, key: &str) -> Result<u64> {
        let values = self.values.read();
        values
            .get(key)
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Config(format!("Setting {} is not an unsigned integer", key)))
    }

    /// Gets a boolean setting
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let values = self.values.read();
        values
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::Config(format!("Setting {} is not a boolean", key)))
    }

    /// Gets a duration setting stored as whole seconds
    pub fn get_duration(&self, key: &str) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_u64(key)?))
    }

    /// Overrides a setting at runtime
    pub fn set(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }
}

//! Configuration management for the earshot server

use crate::error::{Result, ServeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// Configuration for the earshot server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Address the HTTP server binds to (default: 127.0.0.1:8888)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// URL prefix for all feature, temp and repl routes (default: /earshot)
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Maximum number of preview results kept in the ephemeral store
    /// (default: 256); the oldest entries are evicted beyond this
    #[serde(default = "default_temp_capacity")]
    pub temp_capacity: usize,

    /// Optional time-to-live for preview results, in seconds
    #[serde(default)]
    pub temp_ttl_secs: Option<u64>,

    /// Optional deadline for rendering/encoding one feature response, in
    /// milliseconds; exceeding it fails the request with a gateway timeout
    #[serde(default)]
    pub render_timeout_ms: Option<u64>,

    /// Whether to expose Prometheus metrics at /metrics (default: false)
    #[serde(default)]
    pub enable_metrics: bool,
}

// Default value functions for serde
fn default_listen_address() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_base_path() -> String {
    "/earshot".to_string()
}

fn default_temp_capacity() -> usize {
    256
}

impl Default for ServeConfig {
    fn default() -> Self {
        ServeConfig {
            listen_address: default_listen_address(),
            base_path: default_base_path(),
            temp_capacity: default_temp_capacity(),
            temp_ttl_secs: None,
            render_timeout_ms: None,
            enable_metrics: false,
        }
    }
}

impl ServeConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(ServeConfig)` if loading and validation succeed
    /// * `Err(ServeError)` if the file cannot be read or the config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ServeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ServeConfig = serde_yaml::from_str(&content)
            .map_err(|e| ServeError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must parse as a socket address
    /// - base_path must start with '/' and must not end with one
    /// - temp_capacity must be > 0
    /// - temp_ttl_secs and render_timeout_ms must be > 0 when present
    pub fn validate(&self) -> Result<()> {
        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            ServeError::Config(format!(
                "listen_address '{}' is not a socket address: {}",
                self.listen_address, e
            ))
        })?;

        if !self.base_path.starts_with('/') || self.base_path.len() < 2 {
            return Err(ServeError::Config(format!(
                "base_path '{}' must start with '/' and name a prefix",
                self.base_path
            )));
        }
        if self.base_path.ends_with('/') {
            return Err(ServeError::Config(format!(
                "base_path '{}' must not end with '/'",
                self.base_path
            )));
        }

        if self.temp_capacity == 0 {
            return Err(ServeError::Config(
                "temp_capacity must be greater than 0".to_string(),
            ));
        }

        if self.temp_ttl_secs == Some(0) {
            return Err(ServeError::Config(
                "temp_ttl_secs must be greater than 0 when set".to_string(),
            ));
        }

        if self.render_timeout_ms == Some(0) {
            return Err(ServeError::Config(
                "render_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

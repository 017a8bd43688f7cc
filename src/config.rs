// src/config.rs

//! Coordinator configuration.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values. Everything
//! here is a default: callers can override the networking values per fit
//! through the training parameters.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};

/// First port of the ring's contiguous listen range.
pub const DEFAULT_BASE_LISTEN_PORT: u16 = 12400;

/// Seconds a worker waits for its ring peers before giving up.
pub const DEFAULT_LISTEN_TIMEOUT_SECS: u64 = 120;

/// The only supported tree learner: every worker trains on its local rows.
pub const DEFAULT_TREE_LEARNER: &str = "data";

/// Collective ring settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Worker `i` of a round listens on `base_listen_port + i`.
    pub base_listen_port: u16,
    pub listen_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_listen_port: DEFAULT_BASE_LISTEN_PORT,
            listen_timeout_secs: DEFAULT_LISTEN_TIMEOUT_SECS,
        }
    }
}

/// Local trainer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Distribution mode injected into every fit; only "data" is valid.
    pub tree_learner: String,
    /// Fixed thread count per worker; reported core counts apply when unset.
    pub num_threads_override: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            tree_learner: DEFAULT_TREE_LEARNER.to_string(),
            num_threads_override: None,
        }
    }
}

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub network: NetworkConfig,
    pub training: TrainingConfig,
}

impl FromStr for CoordinatorConfig {
    type Err = CoordinatorError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| CoordinatorError::config_with_source("failed to parse TOML config", e))
    }
}

impl CoordinatorConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `RINGBOOST_` and name section and field:
    // - `RINGBOOST_NETWORK_BASE_LISTEN_PORT` overrides `network.base_listen_port`
    // - `RINGBOOST_NETWORK_LISTEN_TIMEOUT_SECS` overrides `network.listen_timeout_secs`
    // - `RINGBOOST_TRAINING_NUM_THREADS` overrides `training.num_threads_override`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("RINGBOOST_NETWORK_BASE_LISTEN_PORT") {
            if let Ok(v) = val.parse() {
                self.network.base_listen_port = v;
            }
        }
        if let Ok(val) = std::env::var("RINGBOOST_NETWORK_LISTEN_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.network.listen_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("RINGBOOST_TRAINING_NUM_THREADS") {
            if let Ok(v) = val.parse() {
                self.training.num_threads_override = Some(v);
            }
        }
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.network.base_listen_port == 0 {
            return Err(CoordinatorError::config(
                "network.base_listen_port must be greater than 0",
            ));
        }

        if self.network.listen_timeout_secs == 0 {
            return Err(CoordinatorError::config(
                "network.listen_timeout_secs must be greater than 0",
            ));
        }

        if self.training.tree_learner != DEFAULT_TREE_LEARNER {
            return Err(CoordinatorError::config(format!(
                "training.tree_learner only supports '{}' (got '{}')",
                DEFAULT_TREE_LEARNER, self.training.tree_learner
            )));
        }

        if self.training.num_threads_override == Some(0) {
            return Err(CoordinatorError::config(
                "training.num_threads_override must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

//! Configuration system for the simulation engine.
//!
//! This module provides YAML/JSON configuration file support for tuning
//! simulation runs declaratively.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   processing_delay_ms: 1000
//!   mailbox_capacity: 64
//!   send_timeout_ms: 500
//!   run_timeout_ms: 30000
//!   hop_budget: 1
//!   log_level: info
//!   failed_nodes: [4]
//!
//! validation:
//!   require_declared_links: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::types::{HopBudget, NodeId};

/// Largest accepted hop budget. Prediction and worst-case run length both
/// grow linearly with the budget.
pub const MAX_HOP_BUDGET: HopBudget = 1024;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Per-run simulation parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Simulated processing time per packet, in milliseconds
    #[serde(default = "default_processing_delay_ms")]
    pub processing_delay_ms: u64,

    /// Capacity of each node's mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// How long a send may wait on a full mailbox before backpressure
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Overall run timeout, in milliseconds
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    /// Number of forwards a seed packet may undergo
    #[serde(default = "default_hop_budget")]
    pub hop_budget: HopBudget,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Nodes modelled as failed devices for the run
    #[serde(default)]
    pub failed_nodes: Vec<NodeId>,
}

fn default_processing_delay_ms() -> u64 {
    1000
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_send_timeout_ms() -> u64 {
    500
}

fn default_run_timeout_ms() -> u64 {
    30_000
}

fn default_hop_budget() -> HopBudget {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            processing_delay_ms: default_processing_delay_ms(),
            mailbox_capacity: default_mailbox_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            run_timeout_ms: default_run_timeout_ms(),
            hop_budget: default_hop_budget(),
            log_level: default_log_level(),
            failed_nodes: Vec::new(),
        }
    }
}

impl SimulationParams {
    /// Returns the per-packet processing delay.
    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    /// Returns the bounded send wait.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Returns the overall run timeout.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// Validates the simulation parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::Validation(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.run_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "run_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.hop_budget > MAX_HOP_BUDGET {
            return Err(ConfigError::Validation(format!(
                "hop_budget must be at most {}, got {}",
                MAX_HOP_BUDGET, self.hop_budget
            )));
        }
        if self.processing_delay_ms >= self.run_timeout_ms {
            tracing::warn!(
                "processing_delay_ms ({}) is not below run_timeout_ms ({}); runs will time out",
                self.processing_delay_ms,
                self.run_timeout_ms
            );
        }
        Ok(())
    }
}

/// Topology validation options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationParams {
    /// Require every port to correspond to a declared link. On unless
    /// explicitly disabled.
    #[serde(default = "default_true")]
    pub require_declared_links: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            require_declared_links: default_true(),
        }
    }
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Per-run parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Topology validation options
    #[serde(default)]
    pub validation: ValidationParams,
}

impl SimConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.simulation.validate()
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-packet processing delay.
    pub fn processing_delay(mut self, delay: Duration) -> Self {
        self.config.simulation.processing_delay_ms = saturating_millis(delay);
        self
    }

    /// Sets the mailbox capacity.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.simulation.mailbox_capacity = capacity;
        self
    }

    /// Sets the bounded send wait.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.simulation.send_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Sets the overall run timeout.
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.config.simulation.run_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Sets the hop budget of seed packets.
    pub fn hop_budget(mut self, budget: HopBudget) -> Self {
        self.config.simulation.hop_budget = budget;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Marks a node as a failed device.
    pub fn fail_node(mut self, id: NodeId) -> Self {
        self.config.simulation.failed_nodes.push(id);
        self
    }

    /// Requires every port to correspond to a declared link.
    pub fn require_declared_links(mut self, enable: bool) -> Self {
        self.config.validation.require_declared_links = enable;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

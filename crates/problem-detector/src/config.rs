//! Detector configuration.
//!
//! Loaded from a YAML file; CLI flags and environment variables override the
//! executor tuning afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use check_engine::ExecutorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checks::hosts::HostVersion;

/// Default per-check timeout in seconds.
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 10;

/// Default number of checks running at once.
pub const DEFAULT_WORKERS: usize = 8;

/// Default grace period for a cancelled check, in milliseconds.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 500;

/// Default connectivity probe deadline in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default minimum free space on the default datastore.
pub const DEFAULT_MIN_FREE_SPACE_PERCENT: f64 = 10.0;

/// Oldest ESXi release the in-tree and CSI drivers support.
pub const DEFAULT_MINIMUM_HOST_VERSION: &str = "6.7.3";

/// Principal audited when the config does not name one.
pub const DEFAULT_USERNAME: &str = "administrator@vsphere.local";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0} must not be empty")]
    Missing(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(String),

    #[error("invalid threshold: {0}")]
    Threshold(String),
}

/// Location of the cluster inside vCenter, as configured for the cloud
/// provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub server: String,
    pub datacenter: String,
    pub default_datastore: String,
    #[serde(default)]
    pub folder: Option<String>,
}

/// Executor tuning and check selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub timeout_secs: u64,
    /// Check name to timeout in seconds.
    pub overrides: BTreeMap<String, u64>,
    pub workers: usize,
    pub grace_period_ms: u64,
    pub connect_timeout_secs: u64,
    pub run_timeout_secs: Option<u64>,
    /// Gate remote calls through one lock when the client is not safe for
    /// concurrent use.
    pub serialize_client: bool,
    /// Built-in checks to skip.
    pub disabled: Vec<String>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
            overrides: BTreeMap::new(),
            workers: DEFAULT_WORKERS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            run_timeout_secs: None,
            serialize_client: false,
            disabled: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub min_free_space_percent: f64,
    pub minimum_host_version: String,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_free_space_percent: DEFAULT_MIN_FREE_SPACE_PERCENT,
            minimum_host_version: DEFAULT_MINIMUM_HOST_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub workspace: WorkspaceConfig,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

impl DetectorConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace.datacenter.trim().is_empty() {
            return Err(ConfigError::Missing("workspace.datacenter"));
        }
        if self.workspace.default_datastore.trim().is_empty() {
            return Err(ConfigError::Missing("workspace.default_datastore"));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        if self.checks.workers == 0 {
            return Err(ConfigError::Zero("checks.workers".into()));
        }
        if self.checks.timeout_secs == 0 {
            return Err(ConfigError::Zero("checks.timeout_secs".into()));
        }
        if self.checks.connect_timeout_secs == 0 {
            return Err(ConfigError::Zero("checks.connect_timeout_secs".into()));
        }
        if self.checks.run_timeout_secs == Some(0) {
            return Err(ConfigError::Zero("checks.run_timeout_secs".into()));
        }
        if let Some((name, _)) = self.checks.overrides.iter().find(|(_, secs)| **secs == 0) {
            return Err(ConfigError::Zero(format!("checks.overrides.{name}")));
        }

        let percent = self.thresholds.min_free_space_percent;
        if !(0.0..=100.0).contains(&percent) {
            return Err(ConfigError::Threshold(format!(
                "min_free_space_percent {percent} is outside 0..=100"
            )));
        }
        self.thresholds
            .minimum_host_version
            .parse::<HostVersion>()
            .map_err(ConfigError::Threshold)?;
        Ok(())
    }

    /// Apply command-line overrides on top of the file.
    pub fn apply_overrides(&mut self, timeout_secs: Option<u64>, workers: Option<usize>) {
        if let Some(timeout_secs) = timeout_secs {
            self.checks.timeout_secs = timeout_secs;
        }
        if let Some(workers) = workers {
            self.checks.workers = workers;
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            per_check_timeout: Duration::from_secs(self.checks.timeout_secs),
            workers: self.checks.workers,
            grace_period: Duration::from_millis(self.checks.grace_period_ms),
            connect_timeout: Duration::from_secs(self.checks.connect_timeout_secs),
            serialize_client: self.checks.serialize_client,
        }
    }

    pub fn check_timeout(&self, name: &str) -> Option<Duration> {
        self.checks
            .overrides
            .get(name)
            .map(|secs| Duration::from_secs(*secs))
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.checks.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.checks.disabled.iter().any(|disabled| disabled == name)
    }
}

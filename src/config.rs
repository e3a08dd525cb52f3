//! Harness configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (COHORT_TUT_SERVER, COHORT_PROBE_TIMEOUT_SECS,
//!    COHORT_AUDIT_LOG, COHORT_PUMP_CAPACITY)
//! 2. YAML config file
//! 3. Defaults
//!
//! The resolved config is a plain value handed to [`CohortHarness::new`];
//! there is no process-global cache. One test run, one config, one harness.
//!
//! [`CohortHarness::new`]: crate::core::CohortHarness::new

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("tut_server_name is required but was not provided")]
    MissingTutServer,
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Server name of the technology under test
    pub tut_server_name: Option<String>,

    /// Per-probe execution budget in seconds; absent means unbounded
    pub probe_timeout_secs: Option<u64>,

    /// Append audit records to this JSONL file
    pub audit_log_path: Option<PathBuf>,

    /// Inbound pump channel capacity
    pub pump_capacity: Option<usize>,
}

/// Resolved harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Server name that identifies the technology under test
    pub tut_server_name: String,

    /// Per-probe execution budget; `None` preserves unbounded execution
    pub probe_timeout: Option<Duration>,

    /// Audit JSONL destination, if file auditing is wanted
    pub audit_log_path: Option<PathBuf>,

    /// Inbound pump channel capacity
    pub pump_capacity: usize,
}

fn default_pump_capacity() -> usize {
    256
}

impl HarnessConfig {
    /// Create a config with defaults for everything but the TUT server name
    pub fn new(tut_server_name: impl Into<String>) -> Self {
        Self {
            tut_server_name: tut_server_name.into(),
            probe_timeout: None,
            audit_log_path: None,
            pump_capacity: default_pump_capacity(),
        }
    }

    /// Parse a config from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        Self::from_file(file)
    }

    /// Load a config from a YAML file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml(&content)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let tut_server_name = file.tut_server_name.ok_or(ConfigError::MissingTutServer)?;

        Ok(Self {
            tut_server_name,
            probe_timeout: file.probe_timeout_secs.map(Duration::from_secs),
            audit_log_path: file.audit_log_path,
            pump_capacity: file.pump_capacity.unwrap_or_else(default_pump_capacity),
        })
    }

    /// Overlay environment variables on top of this config
    pub fn apply_env(mut self) -> Self {
        if let Ok(name) = std::env::var("COHORT_TUT_SERVER") {
            if !name.is_empty() {
                self.tut_server_name = name;
            }
        }
        if let Ok(secs) = std::env::var("COHORT_PROBE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.probe_timeout = Some(Duration::from_secs(secs));
            }
        }
        if let Ok(path) = std::env::var("COHORT_AUDIT_LOG") {
            if !path.is_empty() {
                self.audit_log_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(capacity) = std::env::var("COHORT_PUMP_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                self.pump_capacity = capacity;
            }
        }
        self
    }

    /// Set the per-probe execution budget
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set the audit JSONL destination
    pub fn with_audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = Some(path.into());
        self
    }
}

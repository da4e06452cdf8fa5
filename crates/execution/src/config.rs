//! Configuration for resolution, admission and request processing.

use docflow_core::{ToolCode, VariableId};
use docflow_tools::CommandSpec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::processor::RequestStatus;

/// Admission queue timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Time between turn requests while waiting
    pub poll_interval_secs: u64,
    /// Upper bound on any wait
    pub base_timeout_mins: u64,
    /// Allowance granted per queue position
    pub per_position_allowance_mins: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            base_timeout_mins: 24 * 60,
            per_position_allowance_mins: 60,
        }
    }
}

impl AdmissionConfig {
    /// Create the default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set poll interval.
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set base timeout.
    pub fn with_base_timeout_mins(mut self, mins: u64) -> Self {
        self.base_timeout_mins = mins;
        self
    }

    /// Set per-position allowance.
    pub fn with_per_position_allowance_mins(mut self, mins: u64) -> Self {
        self.per_position_allowance_mins = mins;
        self
    }

    /// Poll interval as a duration (at least one millisecond).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs).max(Duration::from_millis(1))
    }

    /// Base timeout as a duration.
    pub fn base_timeout(&self) -> Duration {
        Duration::from_secs(self.base_timeout_mins.saturating_mul(60))
    }

    /// Per-position allowance as a duration.
    pub fn per_position_allowance(&self) -> Duration {
        Duration::from_secs(self.per_position_allowance_mins.saturating_mul(60))
    }
}

/// Dependency resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deepest recursion allowed
    pub max_depth: usize,
    /// Sources never expanded to a tool, in addition to the reserved tags
    pub excluded_sources: HashSet<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: crate::dependency::DEFAULT_MAX_DEPTH,
            excluded_sources: HashSet::new(),
        }
    }
}

/// How a request with only non-fatal step failures is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// Report the request as failed
    #[default]
    ReportError,
    /// Report the request as done
    ReportDone,
}

impl PartialFailurePolicy {
    /// Overall status for a request whose run had step failures.
    pub fn status(&self) -> RequestStatus {
        match self {
            PartialFailurePolicy::ReportError => RequestStatus::Error,
            PartialFailurePolicy::ReportDone => RequestStatus::Done,
        }
    }
}

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocflowConfig {
    /// Resolver settings
    pub resolver: ResolverConfig,

    /// Admission queue timing
    pub admission: AdmissionConfig,

    /// Reporting policy for partial failures
    pub partial_failure: PartialFailurePolicy,

    /// Commands for calculation tools
    pub tools: HashMap<ToolCode, CommandSpec>,

    /// Commands for deliverable templates
    pub templates: HashMap<ToolCode, CommandSpec>,

    /// Values served to the preparation stage
    pub prep_values: HashMap<VariableId, serde_json::Value>,

    /// Directory for per-request data store files; in memory when unset
    pub store_dir: Option<PathBuf>,
}

impl DocflowConfig {
    /// Parse a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&content)
    }
}

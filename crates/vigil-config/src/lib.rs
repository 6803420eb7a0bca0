//! Shared configuration for the Vigil service lifecycle manager.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then an
//! optional TOML file (`--config-path` or `VIGIL_CONFIG_PATH`), then `VIGIL_*`
//! environment variables, then command-line flags. The resulting [`Config`]
//! carries the two marker paths and the timing budget of the stop protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod defaults;
mod logging;
mod paths;

pub use defaults::{
    DEFAULT_GRACE_PERIOD_MS, DEFAULT_LOG_FILTER, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SERVICE_NAME,
    default_log_filter_string, default_log_format, default_pid_path, default_run_path,
    default_service_name, default_work_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{MarkerPaths, MarkerPathsError};

const fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Runtime configuration for the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "VIGIL")]
pub struct Config {
    /// File holding the detached worker's process id.
    #[serde(default = "default_pid_path")]
    pub pid_path: PathBuf,
    /// File whose existence keeps the worker's service loop running.
    #[serde(default = "default_run_path")]
    pub run_path: PathBuf,
    /// How long `stop` waits for a cooperative exit before forcing one.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Delay between service-loop iterations and between stop polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Display name used in operator-facing messages.
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Surface full error detail instead of single-line summaries.
    #[serde(default)]
    pub debug: bool,
    /// Working directory adopted by the detached worker.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Optional file receiving the worker's stdout and stderr.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Tracing filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Tracing output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pid_path: default_pid_path(),
            run_path: default_run_path(),
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            name: default_service_name(),
            debug: false,
            work_dir: default_work_dir(),
            log_path: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Grace period as a [`Duration`].
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Display name of the managed service.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Tracing output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Worker working directory.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Worker log sink, when configured.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Rejects values the lifecycle protocol cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }
}

/// Semantic validation failures for an otherwise well-formed [`Config`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The poll interval must be positive or the service loop would spin.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    /// The service name is blank.
    #[error("service name must not be empty")]
    EmptyName,
}

//! Requests, states and outcomes exchanged with the lifecycle controller.

use std::fmt;
use std::time::Duration;

use vigil_config::{Config, MarkerPaths, MarkerPathsError};

use crate::service::LoopReport;

/// Lifecycle verbs accepted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Start,
    Stop,
    Restart,
}

impl fmt::Display for LifecycleRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => formatter.write_str("start"),
            Self::Stop => formatter.write_str("stop"),
            Self::Restart => formatter.write_str("restart"),
        }
    }
}

/// Where the controller is within the current request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Values the controller needs from the loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// PID and run marker locations.
    pub paths: MarkerPaths,
    /// How long stop waits for cooperative shutdown before forcing it.
    pub grace_period: Duration,
    /// Pause between loop iterations and between stop's marker checks.
    pub poll_interval: Duration,
    /// Display name used in user-facing messages.
    pub name: String,
    /// Log failures with their full source chain.
    pub debug: bool,
}

impl LifecycleSettings {
    /// Derives settings from `config`, creating the marker directories.
    pub fn from_config(config: &Config) -> Result<Self, MarkerPathsError> {
        Ok(Self {
            paths: MarkerPaths::from_config(config)?,
            grace_period: config.grace_period(),
            poll_interval: config.poll_interval(),
            name: config.name().to_owned(),
            debug: config.debug,
        })
    }
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Seen by the invoker: the worker is detached and recorded.
    Started { pid: u32 },
    /// Seen by the worker once its loop has finished.
    WorkerExited(LoopReport),
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { pid } => write!(formatter, "started (pid {pid})"),
            Self::WorkerExited(report) => write!(
                formatter,
                "exited after {} iterations ({} failed)",
                report.iterations, report.failures
            ),
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No PID marker was present.
    NotRunning,
    /// The worker removed its PID marker within the grace period.
    Clean,
    /// The grace period elapsed and the worker was sent the termination signal.
    Forced { pid: u32 },
    /// The grace period elapsed but the recorded process had already gone.
    AlreadyExited,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => formatter.write_str("is not running"),
            Self::Clean => formatter.write_str("stopped (clean)"),
            Self::Forced { .. } => formatter.write_str("stopped (forced)"),
            Self::AlreadyExited => formatter.write_str("stopped (already exited)"),
        }
    }
}

/// Result of any lifecycle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Start(StartOutcome),
    Stop(StopOutcome),
    /// `stop` is `None` when the stop half failed and was only logged.
    Restarted {
        stop: Option<StopOutcome>,
        start: StartOutcome,
    },
}

impl LifecycleOutcome {
    /// True when this outcome was produced inside the detached worker.
    #[must_use]
    pub const fn is_worker_exit(&self) -> bool {
        matches!(
            self,
            Self::Start(StartOutcome::WorkerExited(_))
                | Self::Restarted {
                    start: StartOutcome::WorkerExited(_),
                    ..
                }
        )
    }
}

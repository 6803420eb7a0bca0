//! Error types surfaced at the CLI boundary.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use vigil_config::{ConfigError, MarkerPathsError};
use vigil_daemon::{LifecycleError, LifecycleRequest, TelemetryError};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
    #[error("failed to prepare marker directories: {0}")]
    MarkerPaths(#[from] MarkerPathsError),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("{name} could not {request}: {source}")]
    Lifecycle {
        name: String,
        request: LifecycleRequest,
        #[source]
        source: LifecycleError,
    },
    #[error("failed to write command output: {0}")]
    Output(#[source] io::Error),
}

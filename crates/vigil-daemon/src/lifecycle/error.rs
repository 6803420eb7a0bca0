//! Error surface exposed by the lifecycle controller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::markers::MarkerError;
use crate::process::{DaemonError, ProcessError};

/// Errors raised while handling a lifecycle request.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
    #[error("failed to detach during {stage}: {source}")]
    DetachFailed {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("cannot determine target process: pid marker {path:?} holds '{content}'")]
    CorruptMarker { path: PathBuf, content: String },
    #[error("marker file {path:?} could not be updated: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl From<MarkerError> for LifecycleError {
    fn from(error: MarkerError) -> Self {
        match error {
            MarkerError::Io { path, source } => Self::Io { path, source },
            MarkerError::CorruptMarker { path, content } => Self::CorruptMarker { path, content },
        }
    }
}

impl From<DaemonError> for LifecycleError {
    fn from(error: DaemonError) -> Self {
        match error {
            DaemonError::AlreadyRunning { pid } => Self::AlreadyRunning { pid },
            DaemonError::DetachFailed { stage, source } => Self::DetachFailed { stage, source },
            DaemonError::Marker(marker) => marker.into(),
            DaemonError::Process(process) => Self::Process(process),
        }
    }
}

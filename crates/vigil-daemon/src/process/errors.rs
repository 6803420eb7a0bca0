//! Error surface for detachment and process signalling.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

use crate::markers::MarkerError;

/// Errors raised while probing or signalling a recorded process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The recorded id cannot address a single process.
    #[error("pid {pid} cannot be signalled: {reason}")]
    InvalidPid {
        /// Offending process id.
        pid: u32,
        /// Why the id was rejected.
        reason: &'static str,
    },
    /// The zero-signal liveness probe failed unexpectedly.
    #[error("failed to check process {pid}: {source}")]
    Probe {
        /// Probed process id.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// Delivering the termination signal failed.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
}

/// Errors surfaced by [`ProcessDetacher::daemonize`](super::ProcessDetacher::daemonize).
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A live instance already owns the PID marker.
    #[error("already running with pid {pid}")]
    AlreadyRunning {
        /// Process id recorded in the PID marker.
        pid: u32,
    },
    /// The OS refused part of the detach sequence.
    #[error("failed to detach process during {stage}: {source}")]
    DetachFailed {
        /// Detach step that failed (`fork`, `setsid`, ...).
        stage: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Reading or writing a marker failed.
    #[error(transparent)]
    Marker(#[from] MarkerError),
    /// Probing the recorded process failed.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl DaemonError {
    pub(crate) fn detach(stage: &'static str, source: impl Into<io::Error>) -> Self {
        Self::DetachFailed {
            stage,
            source: source.into(),
        }
    }
}

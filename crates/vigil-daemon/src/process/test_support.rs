//! Test doubles shared by the daemon's unit tests.

use tempfile::TempDir;

use vigil_config::MarkerPaths;

use super::detacher::{Detached, ProcessDetacher};
use super::errors::DaemonError;
use super::guard::ensure_single_instance;
use crate::markers::MarkerStore;

/// Far above any configurable `pid_max`, so never alive.
pub(crate) const DEAD_PID: u32 = i32::MAX as u32;

/// Marker store rooted in a private temporary directory.
pub(crate) struct TestMarkers {
    _dir: TempDir,
    pub(crate) store: MarkerStore,
}

impl TestMarkers {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let paths = MarkerPaths::new(dir.path().join("svc.pid"), dir.path().join("svc.run"));
        Self {
            _dir: dir,
            store: MarkerStore::new(paths),
        }
    }
}

/// Which side of the detach [`InProcessDetacher`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Invoker,
    Worker,
}

/// Detacher that records a pid without forking.
///
/// The single-instance guard still runs, so stale and live markers behave as
/// they would under [`SystemDetacher`](super::SystemDetacher).
#[derive(Debug, Clone, Copy)]
pub(crate) struct InProcessDetacher {
    side: Side,
    pid: u32,
}

impl InProcessDetacher {
    /// Reports the worker side, recording the current process.
    pub(crate) fn worker() -> Self {
        Self {
            side: Side::Worker,
            pid: std::process::id(),
        }
    }

    /// Reports the invoker side, recording `pid` as the worker.
    pub(crate) const fn invoker(pid: u32) -> Self {
        Self {
            side: Side::Invoker,
            pid,
        }
    }
}

impl ProcessDetacher for InProcessDetacher {
    fn daemonize(&self, markers: &MarkerStore) -> Result<Detached, DaemonError> {
        ensure_single_instance(markers)?;
        markers.write_pid(self.pid)?;
        Ok(match self.side {
            Side::Invoker => Detached::Invoker { pid: self.pid },
            Side::Worker => Detached::Worker { pid: self.pid },
        })
    }
}

use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use super::errors::DaemonError;
use super::liveness::is_alive;
use crate::markers::{MarkerError, MarkerStore};

/// Refuses to proceed while a live process owns the PID marker.
///
/// A marker naming a dead process, or holding garbage, is stale: it is logged
/// and left for the new instance to overwrite.
pub(crate) fn ensure_single_instance(markers: &MarkerStore) -> Result<(), DaemonError> {
    let path = markers.paths().pid_path();
    match markers.read_pid() {
        Ok(None) => Ok(()),
        Ok(Some(pid)) if is_alive(pid)? => {
            debug!(
                target: PROCESS_TARGET,
                pid,
                "refusing to start: existing instance alive"
            );
            Err(DaemonError::AlreadyRunning { pid })
        }
        Ok(Some(pid)) => {
            warn!(
                target: PROCESS_TARGET,
                pid,
                file = %path.display(),
                "existing instance not detected; pid marker is stale"
            );
            Ok(())
        }
        Err(MarkerError::CorruptMarker { content, .. }) => {
            warn!(
                target: PROCESS_TARGET,
                content,
                file = %path.display(),
                "pid marker is corrupt; treating as stale"
            );
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Held by the detached worker for as long as it runs.
///
/// Dropping the guard removes the PID marker, but only while the marker still
/// names this process, so a successor's marker is never deleted.
#[derive(Debug)]
pub(crate) struct PidMarkerGuard<'a> {
    markers: &'a MarkerStore,
    pid: u32,
}

impl<'a> PidMarkerGuard<'a> {
    pub(crate) const fn new(markers: &'a MarkerStore, pid: u32) -> Self {
        Self { markers, pid }
    }
}

impl Drop for PidMarkerGuard<'_> {
    fn drop(&mut self) {
        let file = self.markers.paths().pid_path().display();
        match self.markers.read_pid() {
            Ok(Some(recorded)) if recorded == self.pid => {}
            Ok(Some(recorded)) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid = self.pid,
                    recorded,
                    file = %file,
                    "pid marker names another process; leaving it in place"
                );
                return;
            }
            Ok(None) => return,
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    error = %error,
                    file = %file,
                    "pid marker unreadable at exit; removing it"
                );
            }
        }
        match self.markers.remove_pid_marker() {
            Ok(()) => info!(
                target: PROCESS_TARGET,
                pid = self.pid,
                file = %file,
                "pid marker removed"
            ),
            Err(error) => warn!(
                target: PROCESS_TARGET,
                error = %error,
                file = %file,
                "failed to remove pid marker"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;

    use super::*;
    use crate::process::test_support::{DEAD_PID, TestMarkers};

    #[test]
    fn missing_marker_allows_start() {
        let markers = TestMarkers::new();
        ensure_single_instance(&markers.store).expect("no marker means no instance");
    }

    #[test]
    fn live_marker_refuses_start() {
        let markers = TestMarkers::new();
        let pid = std::process::id();
        markers.store.write_pid(pid).expect("seed");
        let error = ensure_single_instance(&markers.store).expect_err("live instance");
        assert!(matches!(error, DaemonError::AlreadyRunning { pid: found } if found == pid));
    }

    #[rstest]
    #[case::dead_pid(DEAD_PID.to_string())]
    #[case::garbage("not-a-pid".to_owned())]
    fn stale_marker_allows_start(#[case] content: String) {
        let markers = TestMarkers::new();
        fs::write(markers.store.paths().pid_path(), content).expect("seed");
        ensure_single_instance(&markers.store).expect("stale marker should be ignored");
    }

    #[test]
    fn guard_removes_its_own_marker() {
        let markers = TestMarkers::new();
        markers.store.write_pid(41).expect("seed");
        drop(PidMarkerGuard::new(&markers.store, 41));
        assert!(!markers.store.pid_marker_exists());
    }

    #[test]
    fn guard_keeps_a_successors_marker() {
        let markers = TestMarkers::new();
        markers.store.write_pid(42).expect("seed");
        drop(PidMarkerGuard::new(&markers.store, 41));
        assert_eq!(markers.store.read_pid().expect("read"), Some(42));
    }
}

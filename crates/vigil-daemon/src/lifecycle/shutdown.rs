//! Waiting for a cooperative exit and escalating when none arrives.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::LIFECYCLE_TARGET;
use super::error::LifecycleError;
use super::types::StopOutcome;
use crate::markers::MarkerStore;
use crate::process::liveness::{Delivery, is_alive, terminate};

/// Bound on confirming that a signalled worker has gone.
const TERMINATION_CONFIRM: Duration = Duration::from_millis(500);
const CONFIRM_POLL: Duration = Duration::from_millis(50);

/// Polls for the PID marker to disappear, checking every `poll_interval`
/// until `grace` elapses. Returns true once the marker is gone.
pub(super) fn wait_for_marker_removal(
    markers: &MarkerStore,
    grace: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if !markers.pid_marker_exists() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        thread::sleep(poll_interval.min(remaining));
    }
}

/// Forces `pid` to stop after the grace period expired and removes the marker
/// it left behind.
pub(super) fn escalate(markers: &MarkerStore, pid: u32) -> Result<StopOutcome, LifecycleError> {
    if !is_alive(pid)? {
        debug!(target: LIFECYCLE_TARGET, pid, "worker already exited; removing stale pid marker");
        remove_marker_if_owned(markers, pid)?;
        return Ok(StopOutcome::AlreadyExited);
    }
    warn!(
        target: LIFECYCLE_TARGET,
        pid,
        "worker ignored the stop request; forcing termination"
    );
    let outcome = match terminate(pid)? {
        Delivery::Delivered => {
            confirm_exit(pid)?;
            StopOutcome::Forced { pid }
        }
        Delivery::AlreadyGone => StopOutcome::AlreadyExited,
    };
    remove_marker_if_owned(markers, pid)?;
    Ok(outcome)
}

fn confirm_exit(pid: u32) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + TERMINATION_CONFIRM;
    while Instant::now() < deadline {
        if !is_alive(pid)? {
            return Ok(());
        }
        thread::sleep(CONFIRM_POLL);
    }
    warn!(
        target: LIFECYCLE_TARGET,
        pid,
        "worker still visible after the termination signal"
    );
    Ok(())
}

/// A successor may already have recorded itself; its marker stays.
fn remove_marker_if_owned(markers: &MarkerStore, pid: u32) -> Result<(), LifecycleError> {
    match markers.read_pid() {
        Ok(Some(recorded)) if recorded != pid => Ok(()),
        Ok(None) => Ok(()),
        _ => Ok(markers.remove_pid_marker()?),
    }
}

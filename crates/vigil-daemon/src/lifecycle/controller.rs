//! Start, stop and restart flows built on the marker protocol.
//!
//! The controller keeps no state between invocations. Every request
//! re-derives where the service stands from the presence of the PID and run
//! markers.

use tracing::{debug, info, warn};

use super::LIFECYCLE_TARGET;
use super::error::LifecycleError;
use super::shutdown::{escalate, wait_for_marker_removal};
use super::types::{
    LifecycleOutcome, LifecycleRequest, LifecycleSettings, LifecycleState, StartOutcome,
    StopOutcome,
};
use crate::markers::MarkerStore;
use crate::process::{
    DaemonError, Detached, PidMarkerGuard, ProcessDetacher, ensure_single_instance,
};
use crate::service::{ServiceLoop, UnitOfWork};

/// Drives the service through its lifecycle.
///
/// `D` decides how the worker is detached and `W` is the job the worker
/// repeats once detached.
#[derive(Debug)]
pub struct LifecycleController<D, W> {
    settings: LifecycleSettings,
    markers: MarkerStore,
    detacher: D,
    work: W,
    state: LifecycleState,
}

impl<D: ProcessDetacher, W: UnitOfWork> LifecycleController<D, W> {
    /// Builds a controller in the [`LifecycleState::Idle`] state.
    pub fn new(settings: LifecycleSettings, detacher: D, work: W) -> Self {
        let markers = MarkerStore::new(settings.paths.clone());
        Self {
            settings,
            markers,
            detacher,
            work,
            state: LifecycleState::Idle,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Settings the controller was built with.
    pub const fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Handles one lifecycle request.
    ///
    /// In the detached worker, `Start` and `Restart` only return once the
    /// service loop has finished.
    pub fn handle(&mut self, request: LifecycleRequest) -> Result<LifecycleOutcome, LifecycleError> {
        debug!(target: LIFECYCLE_TARGET, %request, "handling lifecycle request");
        let result = match request {
            LifecycleRequest::Start => self.start().map(LifecycleOutcome::Start),
            LifecycleRequest::Stop => self.stop().map(LifecycleOutcome::Stop),
            LifecycleRequest::Restart => self.restart(),
        };
        if let Err(error) = &result {
            self.state = LifecycleState::Failed;
            debug!(target: LIFECYCLE_TARGET, %request, %error, "lifecycle request failed");
        }
        result
    }

    fn start(&mut self) -> Result<StartOutcome, LifecycleError> {
        self.state = LifecycleState::Starting;
        ensure_single_instance(&self.markers)?;
        self.markers.create_run_marker()?;
        match self.detacher.daemonize(&self.markers) {
            Ok(Detached::Invoker { pid }) => {
                self.state = LifecycleState::Running;
                debug!(
                    target: LIFECYCLE_TARGET,
                    pid,
                    name = %self.settings.name,
                    "service started"
                );
                Ok(StartOutcome::Started { pid })
            }
            Ok(Detached::Worker { pid }) => Ok(self.run_worker(pid)),
            Err(error) => Err(self.abandon_start(error)),
        }
    }

    fn run_worker(&mut self, pid: u32) -> StartOutcome {
        let _marker = PidMarkerGuard::new(&self.markers, pid);
        self.state = LifecycleState::Running;
        info!(target: LIFECYCLE_TARGET, pid, "worker running");
        let report = ServiceLoop::new(
            &self.markers,
            self.settings.poll_interval,
            self.settings.debug,
        )
        .run(&mut self.work);
        self.state = LifecycleState::Stopped;
        StartOutcome::WorkerExited(report)
    }

    /// A live instance still needs its run marker; any other failure leaves
    /// nothing to keep running.
    fn abandon_start(&self, error: DaemonError) -> LifecycleError {
        if !matches!(error, DaemonError::AlreadyRunning { .. })
            && let Err(cleanup) = self.markers.remove_run_marker()
        {
            warn!(
                target: LIFECYCLE_TARGET,
                error = %cleanup,
                "failed to remove run marker after start failure"
            );
        }
        error.into()
    }

    fn stop(&mut self) -> Result<StopOutcome, LifecycleError> {
        if !self.markers.pid_marker_exists() {
            debug!(target: LIFECYCLE_TARGET, "no pid marker; nothing to stop");
            return Ok(StopOutcome::NotRunning);
        }
        self.state = LifecycleState::Stopping;
        self.markers.remove_run_marker()?;
        let Some(pid) = self.markers.read_pid()? else {
            self.state = LifecycleState::Stopped;
            return Ok(StopOutcome::Clean);
        };
        debug!(
            target: LIFECYCLE_TARGET,
            pid,
            grace_ms = self.settings.grace_period.as_millis(),
            "stop requested; waiting for worker to exit"
        );
        let outcome = if wait_for_marker_removal(
            &self.markers,
            self.settings.grace_period,
            self.settings.poll_interval,
        ) {
            StopOutcome::Clean
        } else {
            escalate(&self.markers, pid)?
        };
        self.state = LifecycleState::Stopped;
        debug!(target: LIFECYCLE_TARGET, pid, outcome = %outcome, "service stopped");
        Ok(outcome)
    }

    fn restart(&mut self) -> Result<LifecycleOutcome, LifecycleError> {
        let stop = match self.stop() {
            Ok(StopOutcome::NotRunning) => {
                debug!(target: LIFECYCLE_TARGET, "restart found nothing running; starting");
                Some(StopOutcome::NotRunning)
            }
            Ok(outcome) => Some(outcome),
            Err(error) => {
                warn!(
                    target: LIFECYCLE_TARGET,
                    %error,
                    "stop half of restart failed; starting anyway"
                );
                None
            }
        };
        let start = self.start()?;
        Ok(LifecycleOutcome::Restarted { stop, start })
    }
}

//! Lifecycle management for a single detached background service.
//!
//! A service is started by detaching a worker process that repeats a
//! [`UnitOfWork`] for as long as the run marker exists. Stopping removes the
//! run marker and waits for the worker to clean up its PID marker, falling
//! back to a termination signal once the grace period expires.
//!
//! The two marker files are the only state shared between the invoking
//! process and the worker; see [`MarkerStore`].

mod lifecycle;
mod markers;
mod process;
mod service;
mod telemetry;

pub use lifecycle::{
    LifecycleController, LifecycleError, LifecycleOutcome, LifecycleRequest, LifecycleSettings,
    LifecycleState, StartOutcome, StopOutcome,
};
pub use markers::{MarkerError, MarkerStore};
pub use process::liveness::{Delivery, TERMINATION_SIGNAL, is_alive, terminate};
pub use process::{DaemonError, Detached, ProcessDetacher, ProcessError, SystemDetacher};
pub use service::{LoopReport, ServiceLoop, UnitOfWork, WAIT_SLICE, WorkError};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests {
    use rstest::rstest;

    #[rstest]
    #[case(crate::lifecycle::LIFECYCLE_TARGET)]
    #[case(crate::markers::MARKER_TARGET)]
    #[case(crate::process::PROCESS_TARGET)]
    #[case(crate::service::SERVICE_TARGET)]
    fn log_targets_match_crate_filter_directives(#[case] target: &str) {
        assert!(
            target.starts_with(concat!(env!("CARGO_CRATE_NAME"), "::")),
            "{target} would escape a `vigil_daemon=` filter"
        );
    }
}

//! The worker's main loop and the unit of work it repeats.
//!
//! The loop runs for as long as the run marker exists. Each unit of work is
//! isolated: returned errors and panics are logged and counted, and the next
//! iteration proceeds as usual.

use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::markers::MarkerStore;

pub(crate) const SERVICE_TARGET: &str = "vigil_daemon::service";

/// Longest uninterrupted sleep between two run-marker checks.
pub const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Failure reported by a unit of work.
pub type WorkError = Box<dyn Error + Send + Sync + 'static>;

/// One iteration of the worker's job.
pub trait UnitOfWork {
    /// Performs a single unit of work.
    fn perform(&mut self) -> Result<(), WorkError>;
}

impl<F, E> UnitOfWork for F
where
    F: FnMut() -> Result<(), E>,
    E: Into<WorkError>,
{
    fn perform(&mut self) -> Result<(), WorkError> {
        self().map_err(Into::into)
    }
}

/// Totals accumulated by [`ServiceLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Units of work attempted.
    pub iterations: u64,
    /// Units of work that returned an error or panicked.
    pub failures: u64,
}

/// Repeats a unit of work until the run marker disappears.
#[derive(Debug)]
pub struct ServiceLoop<'a> {
    markers: &'a MarkerStore,
    poll_interval: Duration,
    debug: bool,
}

impl<'a> ServiceLoop<'a> {
    /// Builds a loop that pauses `poll_interval` between iterations. With
    /// `debug` set, failures are logged with their full source chain.
    #[must_use]
    pub const fn new(markers: &'a MarkerStore, poll_interval: Duration, debug: bool) -> Self {
        Self {
            markers,
            poll_interval,
            debug,
        }
    }

    /// Runs until the run marker is removed.
    ///
    /// A unit of work already in progress is never interrupted; the marker is
    /// consulted between iterations and during the pause.
    pub fn run<W: UnitOfWork + ?Sized>(&self, work: &mut W) -> LoopReport {
        let mut report = LoopReport::default();
        info!(
            target: SERVICE_TARGET,
            poll_ms = self.poll_interval.as_millis(),
            "service loop started"
        );
        while self.markers.run_marker_exists() {
            report.iterations += 1;
            if let Err(message) = self.attempt(work, report.iterations) {
                report.failures += 1;
                warn!(
                    target: SERVICE_TARGET,
                    iteration = report.iterations,
                    error = %message,
                    "unit of work failed"
                );
            }
            self.pause();
        }
        info!(
            target: SERVICE_TARGET,
            iterations = report.iterations,
            failures = report.failures,
            "run marker removed; service loop finished"
        );
        report
    }

    fn attempt<W: UnitOfWork + ?Sized>(&self, work: &mut W, iteration: u64) -> Result<(), String> {
        debug!(target: SERVICE_TARGET, iteration, "performing unit of work");
        match panic::catch_unwind(AssertUnwindSafe(|| work.perform())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) if self.debug => Err(render_chain(error.as_ref())),
            Ok(Err(error)) => Err(error.to_string()),
            Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    /// Sleeps for the poll interval in slices, returning early once the run
    /// marker is gone.
    fn pause(&self) {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.markers.run_marker_exists() {
                return;
            }
            thread::sleep(remaining.min(WAIT_SLICE));
        }
    }
}

fn render_chain(error: &(dyn Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

//! Lifecycle management for the detached service.
//!
//! - [`types`] defines requests, states, settings and outcomes.
//! - [`error`] captures the error surface exposed to the CLI.
//! - [`shutdown`] waits for cooperative exit and escalates.
//! - [`controller`] implements the start, stop and restart flows.

mod controller;
mod error;
mod shutdown;
mod types;

pub use controller::LifecycleController;
pub use error::LifecycleError;
pub use types::{
    LifecycleOutcome, LifecycleRequest, LifecycleSettings, LifecycleState, StartOutcome,
    StopOutcome,
};

pub(crate) const LIFECYCLE_TARGET: &str = "vigil_daemon::lifecycle";

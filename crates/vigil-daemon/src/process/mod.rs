//! Process-level plumbing: detachment, liveness probes and the PID marker
//! guard held by the detached worker.

mod detacher;
mod errors;
mod guard;
pub mod liveness;
#[cfg(test)]
pub(crate) mod test_support;

pub use detacher::{Detached, ProcessDetacher, SystemDetacher};
#[cfg(test)]
pub(crate) use detacher::MockProcessDetacher;
pub use errors::{DaemonError, ProcessError};
pub(crate) use guard::{PidMarkerGuard, ensure_single_instance};

pub(crate) const PROCESS_TARGET: &str = "vigil_daemon::process";

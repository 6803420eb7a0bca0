//! The unit of work shipped with the binary.

use tracing::info;

use vigil_daemon::{UnitOfWork, WorkError};

const HEARTBEAT_TARGET: &str = "vigil_cli::heartbeat";

/// Logs one numbered beat per iteration.
#[derive(Debug, Clone)]
pub(crate) struct Heartbeat {
    name: String,
    beats: u64,
}

impl Heartbeat {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            beats: 0,
        }
    }

    #[cfg(test)]
    pub(crate) const fn beats(&self) -> u64 {
        self.beats
    }
}

impl UnitOfWork for Heartbeat {
    fn perform(&mut self) -> Result<(), WorkError> {
        self.beats += 1;
        info!(target: HEARTBEAT_TARGET, beat = self.beats, name = %self.name, "heartbeat");
        Ok(())
    }
}

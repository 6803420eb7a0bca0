//! Liveness probing and forced termination of a recorded process id.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::info;

use super::PROCESS_TARGET;
use super::errors::ProcessError;

/// Signal used to force a worker that ignored the cooperative stop request.
pub const TERMINATION_SIGNAL: Signal = Signal::SIGTERM;

/// Result of attempting to deliver the termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The signal was accepted by the kernel.
    Delivered,
    /// No such process existed at delivery time.
    AlreadyGone,
}

/// Checks whether `pid` refers to a live process using a zero signal.
///
/// A process owned by another user answers with `EPERM`, which still proves it
/// exists.
pub fn is_alive(pid: u32) -> Result<bool, ProcessError> {
    let target = to_pid(pid)?;
    match kill(target, None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(ProcessError::Probe { pid, source }),
    }
}

/// Sends [`TERMINATION_SIGNAL`] to `pid`.
pub fn terminate(pid: u32) -> Result<Delivery, ProcessError> {
    let target = to_pid(pid)?;
    match kill(target, TERMINATION_SIGNAL) {
        Ok(()) => {
            info!(
                target: PROCESS_TARGET,
                pid,
                signal = %TERMINATION_SIGNAL,
                "termination signal delivered"
            );
            Ok(Delivery::Delivered)
        }
        Err(Errno::ESRCH) => Ok(Delivery::AlreadyGone),
        Err(source) => Err(ProcessError::Signal { pid, source }),
    }
}

fn to_pid(pid: u32) -> Result<Pid, ProcessError> {
    if pid == 0 {
        return Err(ProcessError::InvalidPid {
            pid,
            reason: "pid 0 addresses the whole process group",
        });
    }
    let raw = i32::try_from(pid).map_err(|_| ProcessError::InvalidPid {
        pid,
        reason: "pid exceeds the platform pid range",
    })?;
    Ok(Pid::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    use rstest::rstest;

    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()).expect("probe"));
    }

    #[test]
    fn unused_pid_is_not_alive() {
        // Far above any configurable pid_max.
        let pid = u32::try_from(i32::MAX).expect("fits");
        assert!(!is_alive(pid).expect("probe"));
    }

    #[rstest]
    #[case::pid_zero(0, "process group")]
    #[case::pid_exceeds_i32_max((i32::MAX as u32) + 1, "exceeds")]
    fn rejects_unaddressable_pids(#[case] invalid_pid: u32, #[case] expected_reason: &str) {
        for result in [is_alive(invalid_pid).map(|_| ()), terminate(invalid_pid).map(|_| ())] {
            let Err(ProcessError::InvalidPid { pid, reason }) = result else {
                panic!("expected InvalidPid, got {result:?}");
            };
            assert_eq!(pid, invalid_pid);
            assert!(
                reason.contains(expected_reason),
                "expected reason to contain '{expected_reason}', got '{reason}'"
            );
        }
    }

    #[test]
    fn terminating_a_missing_process_reports_already_gone() {
        let pid = u32::try_from(i32::MAX).expect("fits");
        assert_eq!(terminate(pid).expect("terminate"), Delivery::AlreadyGone);
    }

    #[test]
    fn terminate_stops_a_child_process() {
        let mut child = match Command::new("sleep").arg("60").spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                eprintln!("skipping test: sleep command not found");
                return;
            }
            Err(e) => panic!("failed to spawn sleep process: {e}"),
        };

        let delivery = terminate(child.id()).expect("terminate");
        assert_eq!(delivery, Delivery::Delivered);

        let status = child.wait().expect("wait for child");
        assert_eq!(status.signal(), Some(TERMINATION_SIGNAL as i32));
    }
}

//! Detaches the worker from the invoking terminal with a double fork.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{Signal, kill};
use nix::sys::stat::{Mode, umask};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, dup2, fork, pipe, setsid};
use tracing::debug;

use vigil_config::Config;

use super::PROCESS_TARGET;
use super::errors::DaemonError;
use super::guard::ensure_single_instance;
use crate::markers::MarkerStore;

const WORKER_UMASK: u32 = 0o027;
const RECORD_WAIT: Duration = Duration::from_secs(5);
const RECORD_POLL: Duration = Duration::from_millis(10);

// Exit codes of the short-lived intermediate process.
const EXIT_SETSID: i32 = 70;
const EXIT_FORK: i32 = 71;
const EXIT_RECORD: i32 = 72;
// Exit code of a worker that could not finish detaching.
const EXIT_SETUP: i32 = 73;

/// Status byte the worker sends once it is fully detached.
const READY: u8 = 0;

/// Which side of the detach a caller finds itself on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// The invoking process; `pid` is the detached worker.
    Invoker {
        /// Process id of the worker recorded in the PID marker.
        pid: u32,
    },
    /// The detached worker itself.
    Worker {
        /// This process's id.
        pid: u32,
    },
}

/// Abstraction over detachment strategies.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessDetacher {
    /// Refuses to run alongside a live instance, then splits into invoker and
    /// worker. Returns once on each side.
    fn daemonize(&self, markers: &MarkerStore) -> Result<Detached, DaemonError>;
}

/// Detacher backed by `fork(2)` and `setsid(2)`.
#[derive(Debug, Clone)]
pub struct SystemDetacher {
    work_dir: PathBuf,
    log_path: Option<PathBuf>,
}

impl SystemDetacher {
    /// Builds a detacher that moves the worker into `work_dir` and sends its
    /// output to `log_path`, or discards it when no log file is set.
    pub fn new(work_dir: impl Into<PathBuf>, log_path: Option<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            log_path,
        }
    }

    /// Builds a detacher from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.work_dir(), config.log_path().map(Path::to_path_buf))
    }
}

impl ProcessDetacher for SystemDetacher {
    fn daemonize(&self, markers: &MarkerStore) -> Result<Detached, DaemonError> {
        ensure_single_instance(markers)?;
        let streams = WorkerStreams::open(&self.work_dir, self.log_path.as_deref())?;
        let (reader, writer) = pipe().map_err(|errno| DaemonError::detach("pipe", errno))?;
        let (status_reader, status_writer) = (File::from(reader), File::from(writer));
        debug!(
            target: PROCESS_TARGET,
            work_dir = %self.work_dir.display(),
            "detaching into background"
        );
        // Buffered output would otherwise be flushed twice.
        io::stdout()
            .flush()
            .map_err(|source| DaemonError::detach("flush", source))?;

        // SAFETY: the intermediate child only calls setsid, fork, the marker
        // writer and `_exit`; the worker re-initialises its own state.
        match unsafe { fork() }.map_err(|errno| DaemonError::detach("fork", errno))? {
            ForkResult::Parent { child } => {
                drop(status_writer);
                await_intermediate(child)?;
                await_worker_ready(status_reader)?;
                let pid = read_worker_pid(markers)?;
                Ok(Detached::Invoker { pid })
            }
            ForkResult::Child => {
                drop(status_reader);
                let pid = run_intermediate(markers);
                Ok(self.become_worker(&streams, markers, pid, status_writer))
            }
        }
    }
}

impl SystemDetacher {
    /// Finishes detaching and tells the invoker how it went. A worker that
    /// cannot finish removes its own marker and exits without output.
    fn become_worker(
        &self,
        streams: &WorkerStreams,
        markers: &MarkerStore,
        pid: u32,
        mut status: File,
    ) -> Detached {
        let outcome = self.settle(streams, markers, pid);
        if outcome.is_err() && markers.read_pid().ok().flatten() == Some(pid) {
            // Nothing can be reported from here; the status byte below tells
            // the invoker that setup failed.
            let _ = markers.remove_pid_marker();
        }
        let byte = match outcome {
            Ok(()) => READY,
            Err(stage) => stage.code(),
        };
        let reported = status.write_all(&[byte]);
        drop(status);
        if outcome.is_err() {
            exit_now(EXIT_SETUP);
        }
        if let Err(error) = reported {
            debug!(target: PROCESS_TARGET, %error, "invoker gone before readiness report");
        }
        debug!(target: PROCESS_TARGET, pid, "worker detached");
        Detached::Worker { pid }
    }

    fn settle(
        &self,
        streams: &WorkerStreams,
        markers: &MarkerStore,
        pid: u32,
    ) -> Result<(), SetupStage> {
        std::env::set_current_dir(&self.work_dir).map_err(|_| SetupStage::Chdir)?;
        umask(Mode::from_bits_truncate(WORKER_UMASK));
        streams.redirect().map_err(|_| SetupStage::Redirect)?;
        await_own_record(markers, pid).map_err(|_| SetupStage::Record)
    }
}

/// Worker setup steps that run after the invoker has been forked off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupStage {
    Chdir = 1,
    Redirect = 2,
    Record = 3,
}

impl SetupStage {
    const fn code(self) -> u8 {
        self as u8
    }

    const fn name_for(code: u8) -> &'static str {
        match code {
            1 => "chdir",
            2 => "redirect stdio",
            3 => "record",
            _ => "worker setup",
        }
    }
}

/// Terminates the current process without running exit handlers or flushing
/// stdio buffers inherited from the invoker.
fn exit_now(code: i32) -> ! {
    // SAFETY: `_exit` is async-signal-safe and never returns.
    unsafe { libc::_exit(code) }
}

/// Runs in the intermediate process. Returns only in the grandchild.
fn run_intermediate(markers: &MarkerStore) -> u32 {
    if setsid().is_err() {
        exit_now(EXIT_SETSID);
    }
    // SAFETY: as above; the intermediate exits without touching shared state.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            let Ok(pid) = u32::try_from(child.as_raw()) else {
                exit_now(EXIT_RECORD);
            };
            if markers.write_pid(pid).is_err() {
                // Best effort: a grandchild that survives never finds its pid
                // recorded and gives up on its own.
                let _ = kill(child, Signal::SIGKILL);
                exit_now(EXIT_RECORD);
            }
            exit_now(0)
        }
        Ok(ForkResult::Child) => std::process::id(),
        Err(_) => exit_now(EXIT_FORK),
    }
}

fn await_intermediate(child: Pid) -> Result<(), DaemonError> {
    let status = loop {
        match waitpid(child, None) {
            Err(Errno::EINTR) => {}
            other => break other.map_err(|errno| DaemonError::detach("waitpid", errno))?,
        }
    };
    match status {
        WaitStatus::Exited(_, 0) => Ok(()),
        WaitStatus::Exited(_, code) => Err(DaemonError::detach(
            stage_for_exit(code),
            io::Error::other(format!("intermediate process exited with status {code}")),
        )),
        other => Err(DaemonError::detach(
            "intermediate",
            io::Error::other(format!("intermediate process ended abnormally: {other:?}")),
        )),
    }
}

/// Blocks until the worker reports its setup result. End of file means the
/// worker died before reporting.
fn await_worker_ready(mut status: impl Read) -> Result<(), DaemonError> {
    let mut byte = [0_u8; 1];
    loop {
        match status.read(&mut byte) {
            Ok(0) => {
                return Err(DaemonError::detach(
                    "worker setup",
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "worker exited before reporting readiness",
                    ),
                ));
            }
            Ok(_) => break,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(DaemonError::detach("worker setup", error)),
        }
    }
    match byte[0] {
        READY => Ok(()),
        code => Err(DaemonError::detach(
            SetupStage::name_for(code),
            io::Error::other("worker failed to finish detaching"),
        )),
    }
}

fn read_worker_pid(markers: &MarkerStore) -> Result<u32, DaemonError> {
    let pid = markers.read_pid()?.ok_or_else(|| {
        DaemonError::detach(
            "record",
            io::Error::new(io::ErrorKind::NotFound, "worker pid was not recorded"),
        )
    })?;
    debug!(target: PROCESS_TARGET, pid, "worker recorded");
    Ok(pid)
}

const fn stage_for_exit(code: i32) -> &'static str {
    match code {
        EXIT_SETSID => "setsid",
        EXIT_FORK => "fork",
        EXIT_RECORD => "record",
        _ => "intermediate",
    }
}

/// The worker may outpace the intermediate's marker write.
fn await_own_record(markers: &MarkerStore, pid: u32) -> Result<(), DaemonError> {
    let deadline = Instant::now() + RECORD_WAIT;
    loop {
        if markers.read_pid().ok().flatten() == Some(pid) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(DaemonError::detach(
                "record",
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    "pid marker never named this worker",
                ),
            ));
        }
        thread::sleep(RECORD_POLL);
    }
}

/// Files opened, and the working directory checked, before forking so
/// failures reach the invoker.
struct WorkerStreams {
    null: File,
    output: Option<File>,
}

impl WorkerStreams {
    fn open(work_dir: &Path, log_path: Option<&Path>) -> Result<Self, DaemonError> {
        let metadata =
            fs::metadata(work_dir).map_err(|source| DaemonError::detach("chdir", source))?;
        if !metadata.is_dir() {
            return Err(DaemonError::detach(
                "chdir",
                io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("{} is not a directory", work_dir.display()),
                ),
            ));
        }
        let null = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/null")
            .map_err(|source| DaemonError::detach("open /dev/null", source))?;
        let output = log_path
            .map(|path| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .mode(0o640)
                    .open(path)
                    .map_err(|source| DaemonError::detach("open log file", source))
            })
            .transpose()?;
        Ok(Self { null, output })
    }

    fn redirect(&self) -> Result<(), DaemonError> {
        let null = self.null.as_raw_fd();
        let output = self.output.as_ref().map_or(null, AsRawFd::as_raw_fd);
        for (source, target) in [
            (null, libc::STDIN_FILENO),
            (output, libc::STDOUT_FILENO),
            (output, libc::STDERR_FILENO),
        ] {
            dup2(source, target).map_err(|errno| DaemonError::detach("redirect stdio", errno))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn exit_codes_name_their_stage() {
        assert_eq!(stage_for_exit(EXIT_SETSID), "setsid");
        assert_eq!(stage_for_exit(EXIT_FORK), "fork");
        assert_eq!(stage_for_exit(EXIT_RECORD), "record");
        assert_eq!(stage_for_exit(1), "intermediate");
    }

    #[test]
    fn unopenable_log_file_fails_before_forking() {
        let dir = TempDir::new().expect("temp dir");
        let log = dir.path().join("missing").join("worker.log");
        let Err(error) = WorkerStreams::open(dir.path(), Some(&log)) else {
            panic!("log file under a missing directory should not open");
        };
        assert!(matches!(
            error,
            DaemonError::DetachFailed { stage: "open log file", .. }
        ));
    }

    #[test]
    fn log_file_is_created_for_append() {
        let dir = TempDir::new().expect("temp dir");
        let log = dir.path().join("worker.log");
        fs::write(&log, "previous\n").expect("seed");
        let streams = WorkerStreams::open(dir.path(), Some(&log)).expect("open");
        let mut output = streams.output.as_ref().expect("log output");
        output.write_all(b"next\n").expect("append");
        assert_eq!(fs::read_to_string(&log).expect("read"), "previous\nnext\n");
    }

    #[test]
    fn missing_work_dir_fails_before_forking() {
        let dir = TempDir::new().expect("temp dir");
        let Err(error) = WorkerStreams::open(&dir.path().join("absent"), None) else {
            panic!("a missing working directory should be rejected");
        };
        assert!(matches!(error, DaemonError::DetachFailed { stage: "chdir", .. }));
    }

    #[test]
    fn work_dir_must_be_a_directory() {
        let dir = TempDir::new().expect("temp dir");
        let file = dir.path().join("plain");
        fs::write(&file, "").expect("seed");
        let Err(error) = WorkerStreams::open(&file, None) else {
            panic!("a regular file is not a working directory");
        };
        assert!(matches!(error, DaemonError::DetachFailed { stage: "chdir", .. }));
    }

    #[test]
    fn ready_byte_completes_the_detach() {
        await_worker_ready(&[READY][..]).expect("worker reported ready");
    }

    #[test]
    fn silent_worker_exit_fails_the_detach() {
        let error = await_worker_ready(io::empty()).expect_err("no report");
        assert!(matches!(error, DaemonError::DetachFailed { stage: "worker setup", .. }));
    }

    #[test]
    fn reported_setup_failure_names_its_stage() {
        let error =
            await_worker_ready(&[SetupStage::Chdir.code()][..]).expect_err("chdir failed");
        assert!(matches!(error, DaemonError::DetachFailed { stage: "chdir", .. }));
    }

    #[test]
    fn closed_status_pipe_reads_as_worker_death() {
        let (reader, writer) = pipe().expect("pipe");
        drop(writer);
        let error = await_worker_ready(File::from(reader)).expect_err("writer closed");
        assert!(matches!(error, DaemonError::DetachFailed { stage: "worker setup", .. }));
    }

    #[test]
    fn worker_record_wait_accepts_own_pid() {
        let markers = crate::process::test_support::TestMarkers::new();
        markers.store.write_pid(std::process::id()).expect("seed");
        await_own_record(&markers.store, std::process::id()).expect("recorded");
    }
}

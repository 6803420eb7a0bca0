use std::env;
use std::path::PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::logging::LogFormat;

/// Cooperative shutdown budget before `stop` escalates, in milliseconds.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 10_000;

/// Delay between service-loop iterations and between stop polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Display name used in operator-facing messages.
pub const DEFAULT_SERVICE_NAME: &str = "My Service";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

const PID_FILE_NAME: &str = "vigil.pid";
const RUN_FILE_NAME: &str = "vigil.run";

/// Default PID marker location inside the per-user runtime directory.
pub fn default_pid_path() -> PathBuf {
    default_marker_directory().join(PID_FILE_NAME)
}

/// Default run marker location, sharing the PID marker's directory.
pub fn default_run_path() -> PathBuf {
    default_marker_directory().join(RUN_FILE_NAME)
}

/// Working directory adopted by the detached worker.
pub fn default_work_dir() -> PathBuf {
    PathBuf::from("/")
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Owned service name used where allocation is required (e.g. serde).
pub fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

fn default_marker_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push("vigil");
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push("vigil");
        dir.push(format!("uid-{}", unsafe { geteuid() }));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push("vigil");
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_share_a_directory() {
        let pid = default_pid_path();
        let run = default_run_path();
        assert_eq!(pid.parent(), run.parent());
        assert!(pid.ends_with(PID_FILE_NAME));
        assert!(run.ends_with(RUN_FILE_NAME));
    }

    #[test]
    fn marker_directory_is_namespaced() {
        let dir = default_marker_directory();
        let tail = dir
            .file_name()
            .and_then(|name| name.to_str())
            .expect("marker dir should have trailing component");
        assert!(
            tail == "vigil" || tail.starts_with("uid-"),
            "unexpected marker dir tail: {tail}"
        );
    }
}

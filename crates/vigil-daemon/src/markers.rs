//! Filesystem-backed PID and run markers.
//!
//! The markers are the only channel between the controller and the detached
//! worker. Each marker has a single writer, so the atomicity of `open`,
//! `rename` and `unlink` is all the coordination the protocol needs.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;
use thiserror::Error;
use tracing::debug;

use vigil_config::MarkerPaths;

pub(crate) const MARKER_TARGET: &str = "vigil_daemon::markers";

/// Errors raised by marker file operations.
#[derive(Debug, Error)]
pub enum MarkerError {
    /// A filesystem operation on a marker failed.
    #[error("marker file '{path}' could not be updated: {source}")]
    Io {
        /// Marker path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The PID marker does not hold a usable process id.
    #[error("pid marker '{path}' holds '{content}', which is not a valid process id")]
    CorruptMarker {
        /// Marker path.
        path: PathBuf,
        /// Trimmed marker content.
        content: String,
    },
}

impl MarkerError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes the two lifecycle markers.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    paths: MarkerPaths,
}

impl MarkerStore {
    /// Wraps the configured marker locations.
    #[must_use]
    pub const fn new(paths: MarkerPaths) -> Self {
        Self { paths }
    }

    /// Marker locations backing this store.
    #[must_use]
    pub const fn paths(&self) -> &MarkerPaths {
        &self.paths
    }

    /// Returns true when the PID marker is present.
    #[must_use]
    pub fn pid_marker_exists(&self) -> bool {
        exists(self.paths.pid_path())
    }

    /// Returns true when the run marker is present.
    #[must_use]
    pub fn run_marker_exists(&self) -> bool {
        exists(self.paths.run_path())
    }

    /// Creates the run marker; an existing marker is left untouched.
    pub fn create_run_marker(&self) -> Result<(), MarkerError> {
        let path = self.paths.run_path();
        let mut options = OpenOptions::new();
        options.write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(path)
            .map_err(|source| MarkerError::io(path, source))?;
        debug!(target: MARKER_TARGET, file = %path.display(), "run marker created");
        Ok(())
    }

    /// Removes the run marker; a missing marker is not an error.
    pub fn remove_run_marker(&self) -> Result<(), MarkerError> {
        remove(self.paths.run_path())
    }

    /// Removes the PID marker; a missing marker is not an error.
    pub fn remove_pid_marker(&self) -> Result<(), MarkerError> {
        remove(self.paths.pid_path())
    }

    /// Reads the process id recorded in the PID marker.
    ///
    /// Returns `Ok(None)` when the marker does not exist.
    pub fn read_pid(&self) -> Result<Option<u32>, MarkerError> {
        let path = self.paths.pid_path();
        match fs::read_to_string(path) {
            Ok(content) => parse_pid(&content).map(Some).ok_or_else(|| {
                MarkerError::CorruptMarker {
                    path: path.to_path_buf(),
                    content: content.trim().to_owned(),
                }
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(MarkerError::io(path, source)),
        }
    }

    /// Records `pid` in the PID marker, replacing any previous content.
    ///
    /// The content is staged in a sibling temporary file and renamed into
    /// place, so readers never observe a partially written id.
    pub fn write_pid(&self, pid: u32) -> Result<(), MarkerError> {
        let path = self.paths.pid_path();
        atomic_write(path, format!("{pid}\n").as_bytes())
            .map_err(|source| MarkerError::io(path, source))?;
        debug!(target: MARKER_TARGET, pid, file = %path.display(), "pid marker written");
        Ok(())
    }
}

fn exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

fn remove(path: &Path) -> Result<(), MarkerError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(target: MARKER_TARGET, file = %path.display(), "marker removed");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MarkerError::io(path, source)),
    }
}

fn parse_pid(content: &str) -> Option<u32> {
    let pid = content.trim().parse::<u32>().ok()?;
    let in_range = pid != 0 && i32::try_from(pid).is_ok();
    in_range.then_some(pid)
}

fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("vigil"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    struct Markers {
        _dir: TempDir,
        store: MarkerStore,
    }

    #[fixture]
    fn markers() -> Markers {
        let dir = TempDir::new().expect("temp dir");
        let paths = MarkerPaths::new(dir.path().join("svc.pid"), dir.path().join("svc.run"));
        Markers {
            _dir: dir,
            store: MarkerStore::new(paths),
        }
    }

    #[rstest]
    fn absent_markers_report_missing(markers: Markers) {
        assert!(!markers.store.pid_marker_exists());
        assert!(!markers.store.run_marker_exists());
        assert_eq!(markers.store.read_pid().expect("read"), None);
    }

    #[rstest]
    fn run_marker_creation_is_idempotent(markers: Markers) {
        markers.store.create_run_marker().expect("first create");
        markers.store.create_run_marker().expect("second create");
        assert!(markers.store.run_marker_exists());
    }

    #[rstest]
    fn removal_is_idempotent(markers: Markers) {
        markers.store.create_run_marker().expect("create");
        markers.store.remove_run_marker().expect("first remove");
        markers.store.remove_run_marker().expect("second remove");
        markers.store.remove_pid_marker().expect("remove missing pid");
        assert!(!markers.store.run_marker_exists());
    }

    #[rstest]
    fn pid_round_trips_through_marker(markers: Markers) {
        markers.store.write_pid(4242).expect("write");
        assert!(markers.store.pid_marker_exists());
        assert_eq!(markers.store.read_pid().expect("read"), Some(4242));
        let raw = fs::read_to_string(markers.store.paths().pid_path()).expect("raw");
        assert_eq!(raw, "4242\n");
    }

    #[rstest]
    fn write_pid_replaces_stale_content(markers: Markers) {
        fs::write(markers.store.paths().pid_path(), "not a pid").expect("seed");
        markers.store.write_pid(7).expect("overwrite");
        assert_eq!(markers.store.read_pid().expect("read"), Some(7));
    }

    #[rstest]
    #[case::empty("")]
    #[case::text("running")]
    #[case::zero("0")]
    #[case::negative("-12")]
    #[case::too_large("2147483648")]
    fn unusable_content_is_corrupt(markers: Markers, #[case] content: &str) {
        fs::write(markers.store.paths().pid_path(), content).expect("seed");
        let error = markers.store.read_pid().expect_err("content should be rejected");
        let MarkerError::CorruptMarker { content: found, .. } = error else {
            panic!("expected CorruptMarker, got {error:?}");
        };
        assert_eq!(found, content.trim());
    }

    #[rstest]
    fn surrounding_whitespace_is_ignored(markers: Markers) {
        fs::write(markers.store.paths().pid_path(), "  99 \n").expect("seed");
        assert_eq!(markers.store.read_pid().expect("read"), Some(99));
    }

    #[cfg(unix)]
    #[rstest]
    fn unwritable_directory_reports_io_error(markers: Markers) {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::geteuid().is_root() {
            eprintln!("skipping test: running as root");
            return;
        }
        let dir = markers.store.paths().run_path().parent().expect("parent");
        fs::set_permissions(dir, fs::Permissions::from_mode(0o500)).expect("restrict");
        let result = markers.store.create_run_marker();
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).expect("restore");
        assert!(matches!(result, Err(MarkerError::Io { .. })));
    }
}

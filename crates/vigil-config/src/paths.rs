//! Derives marker file paths shared by the controller and the worker.
//!
//! Both sides of the lifecycle protocol must agree on where the PID and run
//! markers live; this is the only state they share.

use std::fs::DirBuilder;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

/// Locations of the PID marker and the run marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPaths {
    pid_path: PathBuf,
    run_path: PathBuf,
}

impl MarkerPaths {
    /// Builds marker paths without touching the filesystem.
    #[must_use]
    pub fn new(pid_path: impl Into<PathBuf>, run_path: impl Into<PathBuf>) -> Self {
        Self {
            pid_path: pid_path.into(),
            run_path: run_path.into(),
        }
    }

    /// Derives marker paths from the shared configuration and ensures their
    /// parent directories exist.
    pub fn from_config(config: &Config) -> Result<Self, MarkerPathsError> {
        let paths = Self::new(config.pid_path.clone(), config.run_path.clone());
        paths.prepare()?;
        Ok(paths)
    }

    /// Creates missing parent directories with owner-only permissions.
    pub fn prepare(&self) -> Result<(), MarkerPathsError> {
        prepare_parent(&self.pid_path)?;
        prepare_parent(&self.run_path)
    }

    /// Path to the PID marker.
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the run marker.
    pub fn run_path(&self) -> &Path {
        self.run_path.as_path()
    }
}

fn prepare_parent(path: &Path) -> Result<(), MarkerPathsError> {
    let Some(parent) = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    else {
        return Err(MarkerPathsError::MissingParent {
            path: path.to_path_buf(),
        });
    };

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    if let Err(source) = builder.create(parent)
        && source.kind() != io::ErrorKind::AlreadyExists
    {
        return Err(MarkerPathsError::Directory {
            path: parent.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Errors raised while deriving marker paths.
#[derive(Debug, Error)]
pub enum MarkerPathsError {
    /// The marker path lacked a parent directory.
    #[error("marker path '{path}' has no parent directory")]
    MissingParent { path: PathBuf },
    /// Creating the marker directory failed.
    #[error("failed to prepare marker directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

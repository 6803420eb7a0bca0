//! Structured telemetry shared by the invoker and the detached worker.
//!
//! Events go to stderr. In the worker, stderr is the configured log file.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use vigil_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned once telemetry is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber was already installed by someone else.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use; later calls are no-ops.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(colour_enabled(config, io::stderr().is_terminal()))
        .with_timer(UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

/// The subscriber is installed before the worker detaches, so a configured log
/// file rules out colour even when the invoker runs in a terminal.
fn colour_enabled(config: &Config, stderr_is_terminal: bool) -> bool {
    stderr_is_terminal && config.log_path().is_none()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rstest::rstest;

    use super::*;

    #[test]
    fn invalid_filter_is_rejected_before_installation() {
        let config = Config {
            log_filter: "vigil=[".to_owned(),
            ..Config::default()
        };
        let error = install_subscriber(&config).expect_err("filter should not parse");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }

    #[rstest]
    #[case::terminal(None, true, true)]
    #[case::piped(None, false, false)]
    #[case::log_file_from_terminal(Some("worker.log"), true, false)]
    #[case::log_file_piped(Some("worker.log"), false, false)]
    fn colour_only_reaches_terminals(
        #[case] log_path: Option<&str>,
        #[case] terminal: bool,
        #[case] expected: bool,
    ) {
        let config = Config {
            log_path: log_path.map(PathBuf::from),
            ..Config::default()
        };
        assert_eq!(colour_enabled(&config, terminal), expected);
    }

    #[test]
    fn repeated_initialisation_is_idempotent() {
        let config = Config::default();
        initialise(&config).expect("first initialisation");
        initialise(&config).expect("second initialisation");
    }
}

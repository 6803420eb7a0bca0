//! Command-line grammar shared by the runtime parser and the build script's
//! manual page generator.

use clap::{Parser, Subcommand};

const CONFIGURATION_HELP: &str = "\
Configuration flags go before the verb:
  --config-path <FILE>       TOML configuration file
  --pid-path <FILE>          PID marker location
  --run-path <FILE>          run marker location
  --grace-period-ms <MS>     cooperative shutdown window before forcing
  --poll-interval-ms <MS>    pause between iterations and stop checks
  --name <NAME>              display name in messages
  --debug                    print full error detail
  --work-dir <DIR>           working directory of the worker
  --log-path <FILE>          file receiving the worker's output
  --log-filter <FILTER>      tracing filter expression
  --log-format <FORMAT>      compact or json

Every flag also reads from VIGIL_* environment variables.";

/// Lifecycle manager for a single detached background service.
#[derive(Parser, Debug)]
#[command(
    name = "vigil",
    version,
    disable_help_subcommand = true,
    after_help = CONFIGURATION_HELP
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) verb: Verb,
}

/// Lifecycle verbs.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verb {
    /// Detaches the worker and returns once its pid is recorded.
    Start,
    /// Asks the worker to finish, forcing it after the grace period.
    Stop,
    /// Stops any running worker, then starts a new one.
    Restart,
}

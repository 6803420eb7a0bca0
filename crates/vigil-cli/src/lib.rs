//! Command-line runtime for `vigil`.
//!
//! Parses the lifecycle verb, loads layered configuration, installs telemetry
//! and hands the request to a [`LifecycleController`]. Outcomes are printed to
//! stdout; failures become a single line on stderr and a non-zero exit code.
//!
//! `start` and `restart` return twice: once in the invoking process, which
//! reports the worker's pid, and once in the detached worker after its
//! service loop finishes. The worker prints nothing.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

use vigil_config::Config;
use vigil_daemon::{
    LifecycleController, LifecycleOutcome, LifecycleRequest, LifecycleSettings, StopOutcome,
    SystemDetacher,
};

mod cli;
mod config;
mod errors;
mod heartbeat;

use cli::{Cli, Verb};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
use config::split_config_arguments;
use errors::AppError;
use heartbeat::Heartbeat;

impl From<Verb> for LifecycleRequest {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Start => Self::Start,
            Verb::Stop => Self::Stop,
            Verb::Restart => Self::Restart,
        }
    }
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    loader: &'a L,
    debug: bool,
}

impl<'a, W, E, L> CliRunner<'a, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    const fn new(stdout: &'a mut W, stderr: &'a mut E, loader: &'a L) -> Self {
        Self {
            stdout,
            stderr,
            loader,
            debug: false,
        }
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);

        let cli = match Cli::try_parse_from(split.command_arguments) {
            Ok(cli) => cli,
            Err(error) => return self.report_usage(error),
        };

        match self.execute(cli.verb.into(), &split.config_arguments) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                let _ = if self.debug {
                    writeln!(self.stderr, "{error:?}")
                } else {
                    writeln!(self.stderr, "{error}")
                };
                ExitCode::FAILURE
            }
        }
    }

    fn execute(
        &mut self,
        request: LifecycleRequest,
        config_arguments: &[OsString],
    ) -> Result<(), AppError> {
        let config = self.loader.load(config_arguments)?;
        self.debug = config.debug;
        config.validate()?;
        vigil_daemon::initialise_telemetry(&config)?;

        let settings = LifecycleSettings::from_config(&config)?;
        let mut controller = LifecycleController::new(
            settings,
            SystemDetacher::from_config(&config),
            Heartbeat::new(config.name()),
        );
        let outcome = controller
            .handle(request)
            .map_err(|source| AppError::Lifecycle {
                name: config.name().to_owned(),
                request,
                source,
            })?;
        self.report(&config, &outcome)
    }

    fn report(&mut self, config: &Config, outcome: &LifecycleOutcome) -> Result<(), AppError> {
        if outcome.is_worker_exit() {
            return Ok(());
        }
        let name = config.name();
        match outcome {
            LifecycleOutcome::Start(start) => self.line(name, start),
            LifecycleOutcome::Stop(stop) => self.line(name, stop),
            LifecycleOutcome::Restarted { stop, start } => {
                if let Some(stop) = stop.filter(|stop| *stop != StopOutcome::NotRunning) {
                    self.line(name, &stop)?;
                }
                self.line(name, start)
            }
        }
    }

    fn line(&mut self, name: &str, outcome: &dyn std::fmt::Display) -> Result<(), AppError> {
        writeln!(self.stdout, "{name} {outcome}").map_err(AppError::Output)?;
        self.stdout.flush().map_err(AppError::Output)
    }

    /// Help and version requests succeed on stdout; anything else is a usage
    /// error with clap's exit code.
    fn report_usage(&mut self, error: clap::Error) -> ExitCode {
        let kind = error.kind();
        let exit_code = u8::try_from(error.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from);
        let usage = AppError::CliUsage(error);
        let written = match kind {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => write!(self.stdout, "{usage}"),
            _ => write!(self.stderr, "{usage}"),
        };
        if written.is_err() {
            return ExitCode::FAILURE;
        }
        exit_code
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    CliRunner::new(stdout, stderr, loader).run(args)
}

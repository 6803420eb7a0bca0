//! Separates configuration flags from the lifecycle verb.
//!
//! Configuration flags must precede the verb. They are handed to
//! `ortho_config`, while the verb and anything after it go to clap.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use vigil_config::Config;

use crate::errors::AppError;

/// Flags understood by the configuration loader, with whether each takes a
/// value.
///
/// Keep in sync with the fields of [`vigil_config::Config`].
const CONFIG_CLI_FLAGS: &[(&str, bool)] = &[
    ("--config-path", true),
    ("--pid-path", true),
    ("--run-path", true),
    ("--grace-period-ms", true),
    ("--poll-interval-ms", true),
    ("--name", true),
    ("--debug", false),
    ("--work-dir", true),
    ("--log-path", true),
    ("--log-filter", true),
    ("--log-format", true),
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name plus configuration flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Layers defaults, configuration file, environment and flags.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*text, false),
    };
    CONFIG_CLI_FLAGS
        .iter()
        .find(|(known, _)| *known == flag)
        .map_or(FlagAction::Stop, |&(_, takes_value)| FlagAction::Include {
            needs_value: takes_value && !inline_value,
        })
}

/// Arguments split at the first token that is not a configuration flag.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the configuration flags and their values.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the verb and everything after it.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_arguments: Vec::new(),
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut remaining = rest.iter();
    let mut command_arguments = vec![program.clone()];
    while let Some(argument) = remaining.next() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                if needs_value && let Some(value) = remaining.next() {
                    config_arguments.push(value.clone());
                }
            }
            FlagAction::Stop => {
                command_arguments.push(argument.clone());
                break;
            }
        }
    }
    command_arguments.extend(remaining.cloned());

    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

//! Binary entrypoint; all behaviour lives in [`vigil_cli::run`].

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    vigil_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

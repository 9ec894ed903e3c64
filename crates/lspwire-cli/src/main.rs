//! Command-line driver for the `lspwire` language server client.
//!
//! The binary delegates to [`lspwire_cli::run`], which resolves
//! configuration, installs telemetry, launches the server, and runs one
//! operation against it.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    lspwire_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

//! Command-line runtime for the `lspwire` client.
//!
//! Loads configuration through `ortho_config`, installs telemetry, launches
//! the language server (from `--server-command` or a jdtls installation),
//! runs one operation, and always ends the session with an orderly shutdown.
//! Output streams and the configuration loader are injected so tests can
//! substitute them.

use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use lspwire::{Session, SessionOptions};
use lspwire_config::{Config, LaunchSpec};
use operations::CLI_TARGET;
use tracing::warn;

mod cli;
mod config;
mod errors;
mod jdtls;
mod operations;
mod position;
mod telemetry;
mod workspace;

pub use errors::CliError;
pub use telemetry::TelemetryError;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};

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

/// Runs the CLI with a custom configuration loader.
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
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(&split.command_arguments) {
        Ok(cli) => cli,
        Err(error) => {
            let rendered = error.render().to_string();
            let written = if error.use_stderr() {
                write!(stderr, "{rendered}")
            } else {
                write!(stdout, "{rendered}")
            };
            drop(written);
            return if error.exit_code() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    let result = loader
        .load(&split.config_arguments)
        .map_err(CliError::LoadConfiguration)
        .and_then(|config| execute(&config, &cli, stdout));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            drop(writeln!(stderr, "lspwire: {error}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write>(config: &Config, cli: &Cli, stdout: &mut W) -> Result<(), CliError> {
    config.validate()?;
    telemetry::initialise(config)?;

    let launch = resolve_launch(config, cli.command.root())?;
    let session = Session::start(&launch, SessionOptions::from(config))?;

    let outcome = operations::execute(&session, &cli.command, stdout);
    match session.shutdown_default() {
        Ok(report) if report.forced => {
            warn!(target: CLI_TARGET, "language server had to be killed during shutdown");
        }
        Ok(_) => {}
        Err(error) => warn!(target: CLI_TARGET, error = %error, "shutdown failed"),
    }
    outcome
}

/// Chooses the server launch: a jdtls home wins over `--server-command`.
///
/// Without an explicit working directory the server runs in the project root.
fn resolve_launch(config: &Config, root: &Path) -> Result<LaunchSpec, CliError> {
    let launch = match config.jdtls_home() {
        Some(home) => {
            let data = config
                .jdtls_data()
                .map_or_else(default_jdtls_data, |dir| dir.as_std_path().to_path_buf());
            jdtls::launch_spec(home.as_std_path(), config.java(), &data)?
        }
        None => config.launch_spec().ok_or(CliError::MissingServer)?,
    };

    Ok(match config.working_dir() {
        Some(dir) => launch.with_working_dir(dir.as_std_path()),
        None if launch.working_dir.is_none() => launch.with_working_dir(root),
        None => launch,
    })
}

fn default_jdtls_data() -> PathBuf {
    env::temp_dir().join("lspwire-jdtls-data")
}

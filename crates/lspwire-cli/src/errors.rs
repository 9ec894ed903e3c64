//! Error types surfaced by the command-line driver.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use lspwire::SessionError;
use lspwire_config::ConfigError;
use ortho_config::OrthoError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Failures that end a CLI run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration flags, environment, or file could not be loaded.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<OrthoError>),

    /// A loaded configuration value is out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Neither a server command nor a jdtls home was supplied.
    #[error("no language server configured: pass --server-command or --jdtls-home")]
    MissingServer,

    /// The jdtls distribution has no equinox launcher jar.
    #[error("cannot find org.eclipse.equinox.launcher_*.jar in {}", plugins.display())]
    LauncherNotFound {
        /// Directory that was searched.
        plugins: PathBuf,
    },

    /// A path could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A path cannot be expressed as a `file://` URI.
    #[error("cannot express {} as a file URI", path.display())]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
    },

    /// The search text does not occur in the document.
    #[error("cannot find {needle:?} in {}", path.display())]
    NeedleNotFound {
        /// Text that was searched for.
        needle: String,
        /// Document that was searched.
        path: PathBuf,
    },

    /// The server session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Building or printing JSON failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

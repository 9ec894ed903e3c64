//! Shared configuration for the lspwire engine and its command-line driver.
//!
//! [`Config`] derives [`OrthoConfig`], so values are layered with command-line
//! flags overriding `LSPWIRE_*` environment variables, which override a TOML
//! file (`--config-path` or `LSPWIRE_CONFIG_PATH`), which overrides the
//! built-in defaults (see [`default_log_filter`]). The loaded value yields
//! the server [`LaunchSpec`] and the transport knobs consumed by the session.

mod defaults;
mod launch;
mod logging;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_JAVA_COMMAND, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_SHUTDOWN_TIMEOUT_MS, default_java_command, default_log_filter,
    default_log_filter_string, default_log_format, default_shutdown_timeout,
};
pub use launch::LaunchSpec;
pub use logging::{LogFormat, LogFormatParseError};

/// Configuration shared by the engine and the `lspwire` binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "LSPWIRE")]
pub struct Config {
    /// Language server executable.
    #[serde(default)]
    pub server_command: Option<String>,
    /// Arguments passed to the language server.
    #[serde(default)]
    #[ortho_config(cli_long = "server-arg")]
    pub server_args: Vec<String>,
    /// Working directory for the language server process.
    #[serde(default)]
    pub working_dir: Option<Utf8PathBuf>,
    /// Tracing filter expression (for example `lspwire=debug`).
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Caller-side ceiling on each request, in milliseconds.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Ceiling on waiting for the server to exit, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    #[ortho_config(default = DEFAULT_SHUTDOWN_TIMEOUT_MS)]
    pub shutdown_timeout_ms: u64,
    /// Skip header lines without a colon instead of failing the frame.
    #[serde(default)]
    #[ortho_config(default = false)]
    pub lenient_headers: bool,
    /// Largest accepted frame payload, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    #[ortho_config(default = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
    /// Root of an unpacked jdtls distribution; overrides `server_command`.
    #[serde(default)]
    pub jdtls_home: Option<Utf8PathBuf>,
    /// Java executable used to run jdtls.
    #[serde(default = "default_java_command")]
    #[ortho_config(default = default_java_command())]
    pub java: String,
    /// Directory jdtls uses for its workspace index.
    #[serde(default)]
    pub jdtls_data: Option<Utf8PathBuf>,
}

const fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

const fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_command: None,
            server_args: Vec::new(),
            working_dir: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            request_timeout_ms: None,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            lenient_headers: false,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            jdtls_home: None,
            java: default_java_command(),
            jdtls_data: None,
        }
    }
}

impl Config {
    /// Rejects limits that would make every request or frame fail.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first zero limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "shutdown_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_frame_bytes",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Launch description for the configured server, if a command was given.
    #[must_use]
    pub fn launch_spec(&self) -> Option<LaunchSpec> {
        let command = self.server_command.as_deref()?;
        let mut launch = LaunchSpec::new(command).with_args(self.server_args.iter().cloned());
        if let Some(dir) = &self.working_dir {
            launch = launch.with_working_dir(dir.as_std_path());
        }
        Some(launch)
    }

    /// Configured server command.
    #[must_use]
    pub fn server_command(&self) -> Option<&str> {
        self.server_command.as_deref()
    }

    /// Configured working directory.
    #[must_use]
    pub const fn working_dir(&self) -> Option<&Utf8PathBuf> {
        self.working_dir.as_ref()
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Default caller-side request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Ceiling on orderly shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Whether header lines lacking a colon are skipped.
    #[must_use]
    pub const fn lenient_headers(&self) -> bool {
        self.lenient_headers
    }

    /// Largest accepted frame payload.
    #[must_use]
    pub const fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// jdtls installation, when the Java server should be launched.
    #[must_use]
    pub const fn jdtls_home(&self) -> Option<&Utf8PathBuf> {
        self.jdtls_home.as_ref()
    }

    /// Java executable for jdtls.
    #[must_use]
    pub fn java(&self) -> &str {
        &self.java
    }

    /// Configured jdtls data directory.
    #[must_use]
    pub const fn jdtls_data(&self) -> Option<&Utf8PathBuf> {
        self.jdtls_data.as_ref()
    }
}

/// Errors raised while validating loaded configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A loaded value is outside its accepted range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

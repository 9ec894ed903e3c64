use std::time::Duration;

use crate::logging::LogFormat;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Ceiling on waiting for the server process to exit after `exit`.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Largest `Content-Length` accepted from the peer.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default bound on orderly shutdown.
#[must_use]
pub const fn default_shutdown_timeout() -> Duration {
    Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS)
}

/// Java executable used to run jdtls.
pub const DEFAULT_JAVA_COMMAND: &str = "java";

/// Owned Java command for serde and configuration defaults.
#[must_use]
pub fn default_java_command() -> String {
    DEFAULT_JAVA_COMMAND.to_owned()
}

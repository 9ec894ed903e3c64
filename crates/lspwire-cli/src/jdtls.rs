//! Launch helper for the Eclipse JDT language server.
//!
//! jdtls is an OSGi application started through the equinox launcher jar,
//! with an OS-specific configuration directory and a separate workspace
//! directory for its index.

use std::fs;
use std::path::{Path, PathBuf};

use lspwire_config::LaunchSpec;

use crate::errors::CliError;

const LAUNCHER_PREFIX: &str = "org.eclipse.equinox.launcher_";

const JVM_FLAGS: &[&str] = &[
    "-Declipse.application=org.eclipse.jdt.ls.core.id1",
    "-Dosgi.bundles.defaultStartLevel=4",
    "-Declipse.product=org.eclipse.jdt.ls.core.product",
    "-Dlog.level=ALL",
    "-Xmx1G",
];

/// Finds `plugins/org.eclipse.equinox.launcher_*.jar`, preferring the
/// lexically highest name when several versions are installed.
pub(crate) fn find_launcher_jar(home: &Path) -> Result<PathBuf, CliError> {
    let plugins = home.join("plugins");
    let entries = fs::read_dir(&plugins).map_err(|source| CliError::Read {
        path: plugins.clone(),
        source,
    })?;

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(LAUNCHER_PREFIX) && name.ends_with(".jar"))
        })
        .max()
        .ok_or(CliError::LauncherNotFound { plugins })
}

/// Configuration directory name for an operating system as reported by
/// `std::env::consts::OS`.
pub(crate) fn config_dir_name(os: &str) -> &'static str {
    match os {
        "windows" => "config_win",
        "macos" => "config_mac",
        _ => "config_linux",
    }
}

/// Builds the launch for jdtls installed under `home`.
pub(crate) fn launch_spec(home: &Path, java: &str, data: &Path) -> Result<LaunchSpec, CliError> {
    let launcher = find_launcher_jar(home)?;
    let configuration = home.join(config_dir_name(std::env::consts::OS));

    Ok(LaunchSpec::new(java)
        .with_args(JVM_FLAGS.iter().copied())
        .with_arg("-jar")
        .with_arg(launcher.to_string_lossy())
        .with_arg("-configuration")
        .with_arg(configuration.to_string_lossy())
        .with_arg("-data")
        .with_arg(data.to_string_lossy()))
}

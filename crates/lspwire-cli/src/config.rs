//! Configuration loading for the CLI.
//!
//! Configuration flags lead the command line and are handed to
//! `ortho_config`; everything from the first other token onwards is parsed
//! as the operation.

use std::ffi::{OsStr, OsString};
use std::sync::Arc;

use lspwire_config::Config;
use ortho_config::{OrthoConfig, OrthoError};

/// Flags recognised by the configuration loader, and whether each takes a
/// value.
///
/// Kept in sync with the fields of [`Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[(&str, bool)] = &[
    ("--config-path", true),
    ("--server-command", true),
    ("--server-arg", true),
    ("--working-dir", true),
    ("--log-filter", true),
    ("--log-format", true),
    ("--request-timeout-ms", true),
    ("--shutdown-timeout-ms", true),
    ("--lenient-headers", false),
    ("--max-frame-bytes", true),
    ("--jdtls-home", true),
    ("--java", true),
    ("--jdtls-data", true),
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the leading configuration flags.
    ///
    /// `args` starts with the program name, as `ortho_config` expects.
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>>;
}

/// Loader layering flags over `LSPWIRE_*` variables over the config file.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(args.iter().cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let mut parts = text.splitn(2, '=');
    let flag = parts.next().unwrap_or_default();
    let has_inline_value = parts.next().is_some();

    CONFIG_CLI_FLAGS
        .iter()
        .find(|(known, _)| *known == flag)
        .map_or(FlagAction::Stop, |(_, takes_value)| FlagAction::Include {
            needs_value: *takes_value && !has_inline_value,
        })
}

/// Leading configuration flags and the operation tokens that follow them.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the operation tokens.
    pub(crate) command_arguments: Vec<OsString>,
}

/// Splits `args` at the first token that is not a configuration flag or
/// one of its values.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit::default();
    };

    let mut config_arguments = vec![program.clone()];
    let mut tokens = rest.iter().peekable();
    while let Some(argument) = tokens.peek() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.extend(tokens.next().cloned());
                if needs_value {
                    config_arguments.extend(tokens.next().cloned());
                }
            }
            FlagAction::Stop => break,
        }
    }

    let mut command_arguments = vec![program.clone()];
    command_arguments.extend(tokens.cloned());
    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

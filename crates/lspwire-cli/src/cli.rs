//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default wait for published diagnostics.
pub(crate) const DEFAULT_DIAGNOSTICS_WAIT_MS: u64 = 10_000;

const CONFIGURATION_HELP: &str = "\
Configuration flags come before the operation and may also be set through
LSPWIRE_* environment variables or a TOML file named by --config-path:
  --server-command CMD        language server executable
  --server-arg ARG            argument for the server (repeatable)
  --working-dir DIR           server working directory (default: --root)
  --jdtls-home DIR            launch the Eclipse JDT server from DIR
  --java CMD                  Java executable for jdtls
  --jdtls-data DIR            jdtls workspace index directory
  --log-filter FILTER         tracing filter expression
  --log-format json|compact   log output format
  --request-timeout-ms MS     ceiling on each request
  --shutdown-timeout-ms MS    ceiling on server exit
  --max-frame-bytes BYTES     largest accepted message
  --lenient-headers           skip malformed header lines";

/// Drives a language server through one operation and prints the result.
#[derive(Parser, Debug)]
#[command(
    name = "lspwire",
    version,
    disable_help_subcommand = true,
    after_help = CONFIGURATION_HELP
)]
pub(crate) struct Cli {
    /// Operation to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Project the server should manage.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkspaceArgs {
    /// Project root, sent as the workspace folder.
    #[arg(long, value_name = "DIR")]
    pub(crate) root: PathBuf,
}

/// A document inside the workspace.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentArgs {
    #[command(flatten)]
    pub(crate) workspace: WorkspaceArgs,
    /// Document to open.
    #[arg(long, value_name = "FILE")]
    pub(crate) file: PathBuf,
}

/// A position inside a document, located by searching for text.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub(crate) struct LookupArgs {
    #[command(flatten)]
    pub(crate) document: DocumentArgs,
    /// Text whose first occurrence marks the position.
    #[arg(long, value_name = "TEXT")]
    pub(crate) needle: String,
}

/// Operations run against the server after the handshake.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Prints the capability names the server advertises.
    Capabilities(WorkspaceArgs),
    /// Opens a document and prints the diagnostics published for it.
    Diagnostics {
        #[command(flatten)]
        document: DocumentArgs,
        /// How long to wait for diagnostics.
        #[arg(long, value_name = "MS", default_value_t = DEFAULT_DIAGNOSTICS_WAIT_MS)]
        wait_ms: u64,
    },
    /// Prints hover information at the needle.
    Hover(LookupArgs),
    /// Prints the definition of the symbol at the needle.
    Definition(LookupArgs),
    /// Prints completions just after the needle.
    Completion(LookupArgs),
}

impl Command {
    /// Workspace root the operation runs in.
    pub(crate) const fn root(&self) -> &PathBuf {
        match self {
            Self::Capabilities(workspace) => &workspace.root,
            Self::Diagnostics { document, .. } => &document.workspace.root,
            Self::Hover(lookup) | Self::Definition(lookup) | Self::Completion(lookup) => {
                &lookup.document.workspace.root
            }
        }
    }
}

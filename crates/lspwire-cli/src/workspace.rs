//! Protocol parameters describing the workspace and its documents.

use std::path::{self, Path, PathBuf};
use std::str::FromStr;

use lsp_types::{
    ClientCapabilities, ClientInfo, CompletionClientCapabilities, CompletionItemCapability,
    DidOpenTextDocumentParams, GotoCapability, HoverClientCapabilities, InitializeParams,
    MarkupKind, PublishDiagnosticsClientCapabilities, TextDocumentClientCapabilities,
    TextDocumentItem, Uri, WorkspaceClientCapabilities, WorkspaceFolder,
};
use serde_json::Value;
use url::Url;

use crate::errors::CliError;

const CLIENT_NAME: &str = "lspwire";

/// Converts a filesystem path to a `file://` URI, resolving it against the
/// current directory first.
pub(crate) fn file_uri(path: &Path) -> Result<Uri, CliError> {
    let invalid = || CliError::InvalidPath {
        path: path.to_path_buf(),
    };
    let absolute = path::absolute(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let url = Url::from_file_path(&absolute).map_err(|()| invalid())?;
    Uri::from_str(url.as_str()).map_err(|_| invalid())
}

fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            hover: Some(HoverClientCapabilities {
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                ..HoverClientCapabilities::default()
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                ..GotoCapability::default()
            }),
            completion: Some(CompletionClientCapabilities {
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(true),
                    ..CompletionItemCapability::default()
                }),
                ..CompletionClientCapabilities::default()
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                ..PublishDiagnosticsClientCapabilities::default()
            }),
            ..TextDocumentClientCapabilities::default()
        }),
        workspace: Some(WorkspaceClientCapabilities {
            workspace_folders: Some(true),
            ..WorkspaceClientCapabilities::default()
        }),
        ..ClientCapabilities::default()
    }
}

/// Builds `initialize` params for a workspace rooted at `root`.
///
/// The root is sent both as the single workspace folder and as the legacy
/// `rootUri`, which some servers still read.
pub(crate) fn initialize_params(root: &Path) -> Result<Value, CliError> {
    let root_uri = file_uri(root)?;
    let name = root
        .file_name()
        .map_or_else(|| root_uri.as_str().to_owned(), |name| name.to_string_lossy().into_owned());

    let params = InitializeParams {
        process_id: Some(std::process::id()),
        capabilities: client_capabilities(),
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: root_uri.clone(),
            name,
        }]),
        client_info: Some(ClientInfo {
            name: String::from(CLIENT_NAME),
            version: Some(String::from(env!("CARGO_PKG_VERSION"))),
        }),
        ..InitializeParams::default()
    };

    let mut value = serde_json::to_value(params)?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            String::from("rootUri"),
            Value::String(root_uri.as_str().to_owned()),
        );
    }
    Ok(value)
}

/// Language identifier for a document, derived from its extension.
pub(crate) fn language_id(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("java") => String::from("java"),
        Some("rs") => String::from("rust"),
        Some("py") => String::from("python"),
        Some("ts") => String::from("typescript"),
        Some(other) => other.to_ascii_lowercase(),
        None => String::from("plaintext"),
    }
}

/// A document read from disk, ready to open on the server.
#[derive(Debug, Clone)]
pub(crate) struct OpenDocument {
    pub(crate) path: PathBuf,
    pub(crate) uri: Uri,
    pub(crate) text: String,
}

impl OpenDocument {
    /// Reads `path` and computes its URI.
    pub(crate) fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            uri: file_uri(path)?,
            text,
        })
    }

    /// `textDocument/didOpen` params carrying the full text.
    pub(crate) fn did_open_params(&self) -> DidOpenTextDocumentParams {
        DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: self.uri.clone(),
                language_id: language_id(&self.path),
                version: 1,
                text: self.text.clone(),
            },
        }
    }
}

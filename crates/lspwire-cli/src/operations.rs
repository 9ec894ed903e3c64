//! Operations run against a connected server.

use std::io::Write;
use std::time::Duration;

use lsp_types::{
    CompletionContext, CompletionParams, CompletionTriggerKind, GotoDefinitionParams,
    HoverParams, PartialResultParams, TextDocumentIdentifier, TextDocumentPositionParams,
    WorkDoneProgressParams,
};
use lspwire::Session;
use serde_json::Value;
use tracing::{debug, info};

use crate::cli::{Command, DocumentArgs, LookupArgs};
use crate::errors::CliError;
use crate::position::{Anchor, find_position};
use crate::workspace::{OpenDocument, initialize_params};

/// Log target for CLI progress.
pub(crate) const CLI_TARGET: &str = "lspwire::cli";
const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";

/// Performs the handshake, then runs `command` and writes its result.
pub(crate) fn execute<W: Write>(
    session: &Session,
    command: &Command,
    out: &mut W,
) -> Result<(), CliError> {
    let result = session.initialize(initialize_params(command.root())?)?;
    info!(target: CLI_TARGET, "server initialized");

    match command {
        Command::Capabilities(_) => print_capability_names(&result, out),
        Command::Diagnostics { document, wait_ms } => {
            print_diagnostics(session, document, Duration::from_millis(*wait_ms), out)
        }
        Command::Hover(lookup) => {
            let (document, position) = open_at(session, lookup, Anchor::Start)?;
            let params = HoverParams {
                text_document_position_params: position_params(&document, position),
                work_done_progress_params: WorkDoneProgressParams::default(),
            };
            print_json(&session.request_typed::<_, Value>("textDocument/hover", &params)?, out)
        }
        Command::Definition(lookup) => {
            let (document, position) = open_at(session, lookup, Anchor::Start)?;
            let params = GotoDefinitionParams {
                text_document_position_params: position_params(&document, position),
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            };
            print_json(
                &session.request_typed::<_, Value>("textDocument/definition", &params)?,
                out,
            )
        }
        Command::Completion(lookup) => {
            let (document, position) = open_at(session, lookup, Anchor::End)?;
            let params = completion_params(&document, position);
            print_json(
                &session.request_typed::<_, Value>("textDocument/completion", &params)?,
                out,
            )
        }
    }
}

fn print_capability_names<W: Write>(initialize_result: &Value, out: &mut W) -> Result<(), CliError> {
    let mut names: Vec<&str> = initialize_result
        .get("capabilities")
        .and_then(Value::as_object)
        .map(|capabilities| capabilities.keys().map(String::as_str).collect())
        .unwrap_or_default();
    names.sort_unstable();
    for name in names {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

fn open(session: &Session, args: &DocumentArgs) -> Result<OpenDocument, CliError> {
    let document = OpenDocument::load(&args.file)?;
    session.notify(
        "textDocument/didOpen",
        serde_json::to_value(document.did_open_params())?,
    )?;
    debug!(target: CLI_TARGET, uri = document.uri.as_str(), "document opened");
    Ok(document)
}

fn open_at(
    session: &Session,
    lookup: &LookupArgs,
    anchor: Anchor,
) -> Result<(OpenDocument, lsp_types::Position), CliError> {
    let document = open(session, &lookup.document)?;
    let position = find_position(&document.text, &lookup.needle, anchor).ok_or_else(|| {
        CliError::NeedleNotFound {
            needle: lookup.needle.clone(),
            path: document.path.clone(),
        }
    })?;
    debug!(
        target: CLI_TARGET,
        line = position.line,
        character = position.character,
        "resolved needle position"
    );
    Ok((document, position))
}

fn position_params(
    document: &OpenDocument,
    position: lsp_types::Position,
) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier {
            uri: document.uri.clone(),
        },
        position,
    }
}

/// Completion as if the user asked for it explicitly.
fn completion_params(document: &OpenDocument, position: lsp_types::Position) -> CompletionParams {
    CompletionParams {
        text_document_position: position_params(document, position),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
        context: Some(CompletionContext {
            trigger_kind: CompletionTriggerKind::INVOKED,
            trigger_character: None,
        }),
    }
}

fn print_diagnostics<W: Write>(
    session: &Session,
    args: &DocumentArgs,
    wait: Duration,
    out: &mut W,
) -> Result<(), CliError> {
    let document = open(session, args)?;
    match session.wait_for_notification(PUBLISH_DIAGNOSTICS, Some(document.uri.as_str()), wait) {
        Some(params) => print_json(
            params.get("diagnostics").unwrap_or(&Value::Array(Vec::new())),
            out,
        ),
        None => {
            writeln!(
                out,
                "no diagnostics received within {} ms",
                wait.as_millis()
            )?;
            Ok(())
        }
    }
}

fn print_json<W: Write>(value: &Value, out: &mut W) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::str::FromStr;

    use lsp_types::{Position, Uri};
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn document() -> OpenDocument {
        OpenDocument {
            path: PathBuf::from("/work/Main.java"),
            uri: Uri::from_str("file:///work/Main.java").expect("valid uri"),
            text: String::from("class Main {}"),
        }
    }

    #[rstest]
    fn completion_is_sent_as_invoked() {
        let params = completion_params(&document(), Position::new(0, 6));

        let value = serde_json::to_value(params).expect("params serialize");

        assert_eq!(value["context"], json!({"triggerKind": 1}));
        assert_eq!(value["textDocument"]["uri"], "file:///work/Main.java");
        assert_eq!(value["position"], json!({"line": 0, "character": 6}));
    }

    #[rstest]
    fn capability_names_are_sorted() {
        let mut out = Vec::new();
        let result = json!({"capabilities": {"textDocumentSync": 1, "hoverProvider": true}});

        print_capability_names(&result, &mut out).expect("names print");

        assert_eq!(
            String::from_utf8(out).expect("output is UTF-8"),
            "hoverProvider\ntextDocumentSync\n"
        );
    }
}

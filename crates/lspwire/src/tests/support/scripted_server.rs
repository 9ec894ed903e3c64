//! A peer that answers by method name.
//!
//! | method              | behaviour                                   |
//! |---------------------|---------------------------------------------|
//! | `initialize`        | replies with a fixed capability set         |
//! | `shutdown`          | replies `null`                              |
//! | `fail`              | replies with error `-32602`                 |
//! | `hang`              | never replies                               |
//! | `drop-connection`   | closes both streams                         |
//! | `didOpen` (notify)  | publishes empty diagnostics for the document |
//! | `exit` (notify)     | stops serving                               |
//! | anything else       | echoes the params back as the result        |

use std::thread::{self, JoinHandle};

use serde_json::{Value, json};

use super::{ManualPeer, PUBLISH_DIAGNOSTICS, method_of};

/// Capabilities the scripted server advertises.
pub fn scripted_capabilities() -> Value {
    json!({"capabilities": {"hoverProvider": true, "definitionProvider": true}})
}

/// Handle to a scripted peer thread.
pub struct ScriptedServer {
    handle: JoinHandle<Vec<Value>>,
}

impl ScriptedServer {
    /// Starts serving `peer` on a new thread.
    pub fn spawn(peer: ManualPeer) -> Self {
        Self {
            handle: thread::spawn(move || serve(peer)),
        }
    }

    /// Waits for the peer to stop and returns every message it received.
    pub fn finish(self) -> Vec<Value> {
        self.handle.join().expect("scripted server panicked")
    }
}

fn serve(mut peer: ManualPeer) -> Vec<Value> {
    let mut received = Vec::new();
    while let Some(message) = peer.try_receive() {
        received.push(message.clone());
        let method = method_of(&message).to_owned();
        let is_request = message.get("id").is_some();

        match (method.as_str(), is_request) {
            ("exit", false) | ("drop-connection", true) => break,
            ("textDocument/didOpen", false) => {
                let uri = message
                    .pointer("/params/textDocument/uri")
                    .cloned()
                    .unwrap_or(Value::Null);
                peer.notify(PUBLISH_DIAGNOSTICS, json!({"uri": uri, "diagnostics": []}));
            }
            (_, false) | ("hang", true) => {}
            ("initialize", true) => peer.reply(&message, scripted_capabilities()),
            ("shutdown", true) => peer.reply(&message, Value::Null),
            ("fail", true) => peer.reply_error(&message, -32602, "Invalid params"),
            (_, true) => {
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                peer.reply(&message, params);
            }
        }
    }
    received
}

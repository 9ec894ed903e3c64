//! In-process peers wired to a session through anonymous pipes.

mod scripted_server;

use std::io::{self, BufReader, PipeReader, PipeWriter, Write};
use std::thread;

use serde_json::{Value, json};

use crate::codec::FrameCodec;
use crate::session::{Session, SessionOptions};

pub use scripted_server::ScriptedServer;

/// Method used by servers to push diagnostics.
pub const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";

/// The far end of a session, driven step by step from the test body.
pub struct ManualPeer {
    reader: BufReader<PipeReader>,
    writer: PipeWriter,
    codec: FrameCodec,
}

impl ManualPeer {
    fn new(reader: PipeReader, writer: PipeWriter) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            codec: FrameCodec::default(),
        }
    }

    /// Next message from the client, or `None` once it closed its output.
    pub fn try_receive(&mut self) -> Option<Value> {
        let payload = self
            .codec
            .read_frame(&mut self.reader)
            .expect("client sent a malformed frame")?;
        Some(serde_json::from_slice(&payload).expect("client sent invalid JSON"))
    }

    /// Next message from the client.
    pub fn receive(&mut self) -> Value {
        self.try_receive().expect("client closed its output")
    }

    /// Sends one framed message.
    pub fn send(&mut self, message: &Value) {
        let payload = serde_json::to_vec(message).expect("serialise message");
        FrameCodec::write_frame(&mut self.writer, &payload).expect("write frame");
    }

    /// Writes bytes without framing them.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write raw bytes");
        self.writer.flush().expect("flush raw bytes");
    }

    /// Answers `request` with a result.
    pub fn reply(&mut self, request: &Value, result: Value) {
        let id = request.get("id").cloned().expect("request has no id");
        self.send(&json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }

    /// Answers `request` with an error object.
    pub fn reply_error(&mut self, request: &Value, code: i64, message: &str) {
        let id = request.get("id").cloned().expect("request has no id");
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        }));
    }

    /// Sends a notification.
    pub fn notify(&mut self, method: &str, params: Value) {
        self.send(&json!({"jsonrpc": "2.0", "method": method, "params": params}));
    }
}

/// Returns the `method` member of a message.
pub fn method_of(message: &Value) -> &str {
    message
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Returns the integer `id` member of a message.
pub fn id_of(message: &Value) -> i64 {
    message
        .get("id")
        .and_then(Value::as_i64)
        .expect("message has no integer id")
}

/// Connects a session to a peer over two pipes.
pub fn connect_manual(options: SessionOptions) -> (Session, ManualPeer) {
    let (client_reader, peer_writer) = io::pipe().expect("create pipe");
    let (peer_reader, client_writer) = io::pipe().expect("create pipe");
    let session =
        Session::connect(client_reader, client_writer, options).expect("connect session");
    (session, ManualPeer::new(peer_reader, peer_writer))
}

/// Connects a session and completes the handshake by hand.
pub fn ready_manual() -> (Session, ManualPeer) {
    let (session, mut peer) = connect_manual(SessionOptions::default());
    thread::scope(|scope| {
        let client = scope.spawn(|| session.initialize(json!({"capabilities": {}})));
        let request = peer.receive();
        assert_eq!(method_of(&request), "initialize");
        peer.reply(&request, json!({"capabilities": {}}));
        client
            .join()
            .expect("client thread panicked")
            .expect("initialize failed");
    });
    assert_eq!(method_of(&peer.receive()), "initialized");
    (session, peer)
}

/// Connects a session to a [`ScriptedServer`] running on its own thread.
pub fn connect_scripted() -> (Session, ScriptedServer) {
    let (session, peer) = connect_manual(SessionOptions::default());
    (session, ScriptedServer::spawn(peer))
}

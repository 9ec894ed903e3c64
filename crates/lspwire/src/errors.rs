//! Error types for the framing, transport, and session layers.

use std::io;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::JsonRpcError;
use crate::pending::RegisterError;
use crate::session::SessionState;

/// Malformed frame headers. Always fatal to the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// A header line had no `:` separator.
    #[error("malformed header line: {line:?}")]
    MalformedHeader {
        /// The offending line, without its terminator.
        line: String,
    },

    /// The header block ended without a `Content-Length` header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The `Content-Length` value was not a non-negative integer.
    #[error("invalid Content-Length value: {value:?}")]
    InvalidContentLength {
        /// The raw header value.
        value: String,
    },

    /// A header line ran past the accepted length without a terminator.
    #[error("header line exceeds the {limit} byte limit")]
    HeaderLineTooLong {
        /// Longest accepted line, terminator included.
        limit: usize,
    },

    /// The declared length exceeds the configured ceiling.
    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Declared payload length.
        length: usize,
        /// Configured maximum.
        limit: usize,
    },
}

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer sent a malformed frame.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The peer closed its output part-way through a frame.
    #[error("stream closed {context}")]
    StreamClosed {
        /// Where in the frame the stream ended.
        context: String,
    },

    /// The write side has already been closed.
    #[error("writer already closed")]
    WriterClosed,

    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub(crate) fn closed_in_headers() -> Self {
        Self::StreamClosed {
            context: String::from("while reading headers"),
        }
    }

    pub(crate) fn closed_in_payload(expected: usize, received: usize) -> Self {
        Self::StreamClosed {
            context: format!("after {received} of {expected} payload bytes"),
        }
    }
}

/// Errors surfaced to session callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer answered the request with an error payload.
    #[error("server returned error: {message} (code: {code})")]
    RemotePeer {
        /// The JSON-RPC error code.
        code: i64,
        /// The error message from the server.
        message: String,
        /// Optional structured detail.
        data: Option<Value>,
    },

    /// The request was still pending when the connection terminated.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    /// The operation is not valid in the current session state.
    #[error("{operation} is not valid while the session is {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// The caller's wait for a response expired.
    #[error("request {method} (id {id}) timed out after {timeout_ms}ms")]
    Timeout {
        /// Method of the abandoned request.
        method: String,
        /// Identifier of the abandoned request.
        id: i64,
        /// The wait ceiling in milliseconds.
        timeout_ms: u64,
    },

    /// Transport-level failure while sending.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialisation or deserialisation failed.
    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The language server binary was not found.
    #[error("language server binary not found: {command}")]
    BinaryNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The request could not be registered for correlation.
    #[error("request registration failed: {0}")]
    Registry(RegisterError),

    /// Failed to spawn the language server process or its helpers.
    #[error("failed to spawn language server process: {message}")]
    SpawnFailed {
        /// Description of the spawn failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl SessionError {
    /// Creates a remote peer error from a JSON-RPC error object.
    #[must_use]
    pub fn from_jsonrpc(error: JsonRpcError) -> Self {
        Self::RemotePeer {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }

    pub(crate) const fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// True when the failure came from the transport rather than the peer.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

//! Language Server Protocol client plumbing.
//!
//! The crate speaks JSON-RPC 2.0 with Content-Length framing to a language
//! server over a pair of byte streams, usually the stdio of a child process.
//! It is layered bottom-up:
//!
//! - [`FrameCodec`] reads and writes individual frames.
//! - [`Transport`] owns the two streams; its writing half serialises whole
//!   frames so concurrent senders never interleave.
//! - [`Correlator`] allocates request ids, tracks pending requests, and runs
//!   the single dispatch thread that routes every inbound message.
//! - [`Session`] adds the lifecycle: spawn, handshake, requests, and an
//!   orderly, bounded shutdown.
//!
//! ```ignore
//! use lspwire::{Session, SessionOptions};
//! use lspwire_config::LaunchSpec;
//! use serde_json::json;
//!
//! let session = Session::start(&LaunchSpec::new("rust-analyzer"), SessionOptions::default())?;
//! let capabilities = session.initialize(json!({"capabilities": {}}))?;
//! let hover = session.request("textDocument/hover", params)?;
//! session.shutdown_default()?;
//! ```

mod codec;
mod correlator;
mod errors;
mod jsonrpc;
mod notifications;
mod pending;
mod session;
mod transport;

pub use codec::{CONTENT_LENGTH, FrameCodec, HeaderPolicy, MAX_HEADER_LINE_BYTES};
pub use correlator::{Correlator, DispatchExit, PendingCall};
pub use errors::{FramingError, SessionError, TransportError};
pub use jsonrpc::{
    INTERNAL_ERROR, IncomingMessage, JSONRPC_VERSION, JsonRpcError, JsonRpcNotification,
    JsonRpcReply, JsonRpcRequest, METHOD_NOT_FOUND, RequestId,
};
pub use notifications::{NotificationHandler, NotificationSink, RequestHandler, TopicKey};
pub use pending::{PendingReceiver, PendingTable, RegisterError, WaitOutcome};
pub use session::{Session, SessionOptions, SessionState, ShutdownReport};
pub use transport::{FrameReader, FrameWriter, Transport};

#[cfg(test)]
mod tests;

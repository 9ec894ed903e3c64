//! Request/response correlation and the dispatch loop.
//!
//! Callers allocate an identifier, register a pending entry, send the frame,
//! and block on their own entry. One dispatch thread reads every inbound frame
//! and either resolves the matching entry, answers a server request, or routes
//! a notification. When the stream ends every remaining entry fails with
//! [`SessionError::ConnectionClosed`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{SessionError, TransportError};
use crate::jsonrpc::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcReply, JsonRpcRequest, RequestId,
};
use crate::notifications::{HandlerSlot, NotificationHandler, NotificationSink, RequestHandler};
use crate::pending::{PendingReceiver, PendingTable, RegisterError, WaitOutcome};
use crate::transport::{FrameReader, FrameWriter};

/// Log target for correlation and dispatch.
pub(crate) const DISPATCH_TARGET: &str = "lspwire::dispatch";

/// Why the dispatch loop stopped.
#[derive(Debug)]
pub enum DispatchExit {
    /// The peer closed its output between frames.
    EndOfStream,
    /// Reading failed: malformed frame, truncated frame, or I/O error.
    Failed(TransportError),
}

/// State shared between callers and the dispatch thread.
struct Shared {
    writer: FrameWriter,
    pending: PendingTable<Value, SessionError>,
    sink: NotificationSink,
    notification_handler: HandlerSlot<NotificationHandler>,
    request_handler: HandlerSlot<RequestHandler>,
}

/// Assigns identifiers, tracks in-flight requests, and routes inbound
/// messages for one connection.
pub struct Correlator {
    shared: Arc<Shared>,
    next_id: AtomicI64,
}

impl Correlator {
    /// Creates a correlator that sends through `writer`.
    #[must_use]
    pub fn new(writer: FrameWriter) -> Self {
        Self {
            shared: Arc::new(Shared {
                writer,
                pending: PendingTable::new(),
                sink: NotificationSink::new(),
                notification_handler: HandlerSlot::default(),
                request_handler: HandlerSlot::default(),
            }),
            next_id: AtomicI64::new(1),
        }
    }

    /// Allocates the next request identifier. The first is 1.
    fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Sends a request and returns the handle to wait on.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConnectionClosed` once the connection has
    /// terminated, `SessionError::Codec` if the params cannot be encoded, and
    /// `SessionError::Transport` if the write fails.
    pub fn begin_request(&self, method: &str, params: Value) -> Result<PendingCall, SessionError> {
        let id = self.next_id();
        let payload = serde_json::to_vec(&JsonRpcRequest::new(id, method, params))?;
        let receiver = self.shared.pending.register(id).map_err(|error| match error {
            RegisterError::Closed => SessionError::ConnectionClosed,
            RegisterError::Duplicate(_) => SessionError::Registry(error),
        })?;

        debug!(target: DISPATCH_TARGET, method, id, "sending request");

        if let Err(error) = self.shared.writer.send(&payload) {
            self.shared.pending.cancel(id);
            return Err(error.into());
        }

        Ok(PendingCall {
            id,
            method: method.to_owned(),
            receiver: Some(receiver),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Sends a request and blocks until its response arrives.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RemotePeer` for an error response,
    /// `SessionError::ConnectionClosed` if the connection ends first, and the
    /// errors of [`begin_request`](Self::begin_request).
    pub fn issue_request(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.begin_request(method, params)?.wait()
    }

    /// Sends a request and waits at most `timeout` for its response.
    ///
    /// # Errors
    ///
    /// As [`issue_request`](Self::issue_request), plus `SessionError::Timeout`
    /// when the wait expires. The entry is removed on timeout and a late
    /// response is discarded.
    pub fn issue_request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        self.begin_request(method, params)?.wait_timeout(timeout)
    }

    /// Sends a notification. Returns once the frame is flushed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Codec` or `SessionError::Transport`.
    pub fn issue_notification(&self, method: &str, params: Value) -> Result<(), SessionError> {
        let payload = serde_json::to_vec(&JsonRpcNotification::new(method, params))?;

        debug!(target: DISPATCH_TARGET, method, "sending notification");

        self.shared.writer.send(&payload)?;
        Ok(())
    }

    /// Spawns the dispatch thread reading from `reader`.
    ///
    /// `on_close` runs on the dispatch thread after the loop stops and before
    /// pending entries are failed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SpawnFailed` if the thread cannot be created.
    pub fn start_dispatch<F>(
        &self,
        reader: FrameReader,
        on_close: F,
    ) -> Result<JoinHandle<DispatchExit>, SessionError>
    where
        F: FnOnce(&DispatchExit, &NotificationSink) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(String::from("lspwire-dispatch"))
            .spawn(move || run_dispatch(&shared, reader, on_close))
            .map_err(|source| SessionError::SpawnFailed {
                message: String::from("failed to start dispatch thread"),
                source: Arc::new(source),
            })
    }

    /// Installs the notification handler, replacing any previous one.
    pub fn set_notification_handler(&self, handler: NotificationHandler) {
        self.shared.notification_handler.set(handler);
    }

    /// Installs the server request handler, replacing any previous one.
    pub fn set_request_handler(&self, handler: RequestHandler) {
        self.shared.request_handler.set(handler);
    }

    /// Latest-notification store.
    #[must_use]
    pub fn sink(&self) -> &NotificationSink {
        &self.shared.sink
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.pending.len()
    }

    /// Closes the write side, signalling end of input to the peer.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the final flush fails.
    pub fn close_writer(&self) -> Result<(), TransportError> {
        self.shared.writer.close()
    }

    /// Fails every pending entry with `ConnectionClosed` and refuses new ones.
    pub fn close_pending(&self) -> usize {
        self.shared
            .pending
            .close_with(|| SessionError::ConnectionClosed)
    }
}

/// An issued request whose response has not been collected yet.
///
/// Dropping it without waiting abandons the request: its entry is removed and
/// a late response is discarded.
#[derive(Debug)]
pub struct PendingCall {
    id: RequestId,
    method: String,
    receiver: Option<PendingReceiver<Value, SessionError>>,
    shared: Arc<Shared>,
}

impl PendingCall {
    /// Identifier assigned to the request.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Blocks until the response arrives.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RemotePeer` for an error response and
    /// `SessionError::ConnectionClosed` if the connection ends first.
    pub fn wait(mut self) -> Result<Value, SessionError> {
        let Some(receiver) = self.receiver.take() else {
            return Err(SessionError::ConnectionClosed);
        };
        receiver.wait().unwrap_or(Err(SessionError::ConnectionClosed))
    }

    /// Blocks until the response arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus `SessionError::Timeout`.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<Value, SessionError> {
        let Some(receiver) = self.receiver.take() else {
            return Err(SessionError::ConnectionClosed);
        };
        match receiver.wait_timeout(timeout) {
            WaitOutcome::Resolved(outcome) => outcome,
            WaitOutcome::Abandoned => Err(SessionError::ConnectionClosed),
            WaitOutcome::TimedOut => {
                if !self.shared.pending.cancel(self.id) {
                    // Resolved between the timeout and the cancel.
                    if let WaitOutcome::Resolved(outcome) = receiver.wait_timeout(Duration::ZERO)
                    {
                        return outcome;
                    }
                }
                warn!(
                    target: DISPATCH_TARGET,
                    method = %self.method,
                    id = self.id,
                    timeout_ms = duration_millis(timeout),
                    "abandoning request after timeout"
                );
                Err(SessionError::Timeout {
                    method: self.method.clone(),
                    id: self.id,
                    timeout_ms: duration_millis(timeout),
                })
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.receiver.is_some() {
            self.shared.pending.cancel(self.id);
        }
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("in_flight", &self.pending.len())
            .field("writer_closed", &self.writer.is_closed())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("shared", &self.shared)
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn run_dispatch<F>(shared: &Arc<Shared>, mut reader: FrameReader, on_close: F) -> DispatchExit
where
    F: FnOnce(&DispatchExit, &NotificationSink),
{
    let exit = loop {
        match reader.receive() {
            Ok(Some(payload)) => route(shared, &payload),
            Ok(None) => break DispatchExit::EndOfStream,
            Err(error) => break DispatchExit::Failed(error),
        }
    };

    match &exit {
        DispatchExit::EndOfStream => {
            debug!(target: DISPATCH_TARGET, "peer closed its output");
        }
        DispatchExit::Failed(error) => {
            warn!(target: DISPATCH_TARGET, error = %error, "dispatch loop terminated");
        }
    }

    on_close(&exit, &shared.sink);
    let drained = shared
        .pending
        .close_with(|| SessionError::ConnectionClosed);
    if drained > 0 {
        debug!(
            target: DISPATCH_TARGET,
            drained, "failed pending requests after connection closed"
        );
    }
    exit
}

fn route(shared: &Arc<Shared>, payload: &[u8]) {
    match IncomingMessage::from_bytes(payload) {
        Ok(IncomingMessage::Response { id, outcome }) => complete(shared, &id, outcome),
        Ok(IncomingMessage::Notification { method, params }) => deliver(shared, &method, &params),
        Ok(IncomingMessage::ServerRequest { id, method, params }) => {
            answer(shared, id, &method, &params);
        }
        Ok(IncomingMessage::Unrecognized(value)) => {
            warn!(
                target: DISPATCH_TARGET,
                message = %value,
                "dropping message that is neither a response nor a notification"
            );
        }
        Err(error) => {
            warn!(
                target: DISPATCH_TARGET,
                error = %error,
                bytes = payload.len(),
                "dropping payload that is not a JSON-RPC object"
            );
        }
    }
}

fn complete(shared: &Shared, id: &Value, outcome: Result<Value, JsonRpcError>) {
    let Some(request_id) = id.as_i64() else {
        warn!(target: DISPATCH_TARGET, id = %id, "discarding response with non-integer id");
        return;
    };
    let resolved = shared
        .pending
        .resolve(request_id, outcome.map_err(SessionError::from_jsonrpc));
    if resolved {
        debug!(target: DISPATCH_TARGET, id = request_id, "response matched");
    } else {
        warn!(
            target: DISPATCH_TARGET,
            id = request_id,
            "discarding response with no pending request"
        );
    }
}

fn deliver(shared: &Shared, method: &str, params: &Value) {
    debug!(target: DISPATCH_TARGET, method, "received notification");
    shared.sink.record(method, params);
    shared
        .notification_handler
        .with_handler(|handler| handler(method, params));
}

fn answer(shared: &Arc<Shared>, id: Value, method: &str, params: &Value) {
    let outcome = shared
        .request_handler
        .with_handler(|handler| handler(method, params))
        .unwrap_or_else(|| Err(JsonRpcError::method_not_found(method)));
    debug!(
        target: DISPATCH_TARGET,
        method,
        id = %id,
        handled = outcome.is_ok(),
        "answering server request"
    );

    let payload = match serde_json::to_vec(&JsonRpcReply::new(id, outcome)) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(target: DISPATCH_TARGET, error = %error, "failed to encode reply");
            return;
        }
    };

    // The reply is written off the dispatch thread: a caller may hold the
    // writer while the peer waits for us to drain its output.
    let writer_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(String::from("lspwire-reply"))
        .spawn(move || {
            if let Err(error) = writer_shared.writer.send(&payload) {
                debug!(target: DISPATCH_TARGET, error = %error, "failed to send reply");
            }
        });
    if let Err(error) = spawned {
        warn!(target: DISPATCH_TARGET, error = %error, "failed to spawn reply thread");
    }
}

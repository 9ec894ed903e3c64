//! Client sessions with a language server.
//!
//! A [`Session`] owns one connection: the framed transport, the correlator
//! and its dispatch thread, and, when it spawned the server itself, the
//! child process. Requests may be issued from any number of threads; each
//! caller blocks only on its own response.
//!
//! ```text
//! Unstarted --initialize--> Handshaking --(response + initialized)--> Ready
//!     any but ShuttingDown --shutdown--> ShuttingDown --> Closed
//!     Unstarted | Handshaking | Ready --(connection lost)--> Closed
//! ```

mod process;
mod state;

use std::io::{Read, Write};
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lspwire_config::{Config, LaunchSpec, default_shutdown_timeout};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::codec::{FrameCodec, HeaderPolicy};
use crate::correlator::{Correlator, DispatchExit};
use crate::errors::SessionError;
use crate::jsonrpc::JsonRpcError;
use crate::notifications::TopicKey;
use crate::transport::Transport;

pub use state::SessionState;
pub(crate) use state::StateCell;

/// Log target for session lifecycle events.
pub(crate) const SESSION_TARGET: &str = "lspwire::session";

/// Tunables applied when a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Frame codec used for both directions.
    pub codec: FrameCodec,
    /// Default ceiling for [`Session::request`]; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Budget used by [`Session::shutdown_default`].
    pub shutdown_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            codec: FrameCodec::default(),
            request_timeout: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        let policy = if config.lenient_headers() {
            HeaderPolicy::Lenient
        } else {
            HeaderPolicy::Strict
        };
        Self {
            codec: FrameCodec::new(policy, config.max_frame_bytes()),
            request_timeout: config.request_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// What [`Session::shutdown`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// State the session was in when shutdown began.
    pub previous_state: SessionState,
    /// Exit status of the spawned server, when there was one and it was reaped.
    pub exit_status: Option<ExitStatus>,
    /// True when the server had to be killed.
    pub forced: bool,
}

#[derive(Default)]
struct Workers {
    dispatch: Option<JoinHandle<DispatchExit>>,
    stderr: Option<JoinHandle<()>>,
}

/// A client connection to one language server.
pub struct Session {
    label: String,
    options: SessionOptions,
    state: Arc<StateCell>,
    correlator: Correlator,
    child: Mutex<Option<Child>>,
    workers: Mutex<Workers>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl Session {
    /// Spawns the server described by `launch` and connects to its stdio.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::BinaryNotFound` when the command does not exist
    /// and `SessionError::SpawnFailed` for any other start-up failure.
    pub fn start(launch: &LaunchSpec, options: SessionOptions) -> Result<Self, SessionError> {
        let spawned = process::spawn(launch)?;
        let label = launch.display_command();
        let mut child = spawned.child;

        let stderr = match spawned
            .stderr
            .map(|stderr| process::drain_stderr(stderr, label.clone()))
            .transpose()
        {
            Ok(stderr) => stderr,
            Err(error) => {
                process::kill_and_reap(&mut child);
                return Err(error);
            }
        };

        let transport = Transport::new(spawned.stdout, spawned.stdin, options.codec);
        Self::establish(label, transport, options, Some(child), stderr)
    }

    /// Connects to a peer over an existing pair of streams.
    ///
    /// `reader` carries the peer's output and `writer` its input.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SpawnFailed` if the dispatch thread cannot start.
    pub fn connect<R, W>(reader: R, writer: W, options: SessionOptions) -> Result<Self, SessionError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let transport = Transport::new(reader, writer, options.codec);
        Self::establish(String::from("connected peer"), transport, options, None, None)
    }

    fn establish(
        label: String,
        transport: Transport,
        options: SessionOptions,
        child: Option<Child>,
        stderr: Option<JoinHandle<()>>,
    ) -> Result<Self, SessionError> {
        let (reader, writer) = transport.split();
        let session = Self {
            label,
            options,
            state: Arc::new(StateCell::new()),
            correlator: Correlator::new(writer),
            child: Mutex::new(child),
            workers: Mutex::new(Workers {
                dispatch: None,
                stderr,
            }),
        };

        let state = Arc::clone(&session.state);
        // On failure the session drops here and its Drop kills the child.
        let dispatch = session
            .correlator
            .start_dispatch(reader, move |_exit, sink| {
                if state.connection_lost() {
                    sink.clear();
                }
            })?;
        lock(&session.workers).dispatch = Some(dispatch);

        info!(target: SESSION_TARGET, server = %session.label, pid = ?session.pid(), "session connected");
        Ok(session)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Process id of the spawned server, if this session spawned one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        lock(&self.child).as_ref().map(Child::id)
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.correlator.in_flight()
    }

    /// Marks the session closed when a send failure shows the connection is
    /// gone.
    fn note_failure(&self, error: &SessionError) {
        if error.is_transport() && self.state.connection_lost() {
            warn!(target: SESSION_TARGET, server = %self.label, error = %error, "send failed, closing session");
            self.correlator.sink().clear();
        }
    }

    fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, SessionError> {
        let pending = self
            .correlator
            .begin_request(method, params)
            .inspect_err(|error| self.note_failure(error))?;
        match timeout {
            Some(timeout) => pending.wait_timeout(timeout),
            None => pending.wait(),
        }
    }

    /// Performs the `initialize` / `initialized` handshake.
    ///
    /// Returns the server's `initialize` result. On failure the session stays
    /// in `Handshaking` and the handshake may be retried.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is `Unstarted`
    /// or `Handshaking`, and any request error from the `initialize` call.
    pub fn initialize(&self, params: Value) -> Result<Value, SessionError> {
        self.state.transition(
            "initialize",
            &[SessionState::Unstarted, SessionState::Handshaking],
            SessionState::Handshaking,
        )?;

        let result = self.call("initialize", params, self.options.request_timeout)?;
        self.correlator
            .issue_notification("initialized", json!({}))
            .inspect_err(|error| self.note_failure(error))?;
        self.state
            .transition("initialized", &[SessionState::Handshaking], SessionState::Ready)?;

        info!(target: SESSION_TARGET, server = %self.label, "handshake complete");
        Ok(result)
    }

    /// Sends a request and blocks until its response arrives, or until the
    /// configured request timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is `Ready`,
    /// `SessionError::RemotePeer` for an error response,
    /// `SessionError::ConnectionClosed` if the connection ends first, and
    /// `SessionError::Timeout` if a configured timeout expires.
    pub fn request(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.state.require("request", &[SessionState::Ready])?;
        self.call(method, params, self.options.request_timeout)
    }

    /// Sends a request with an explicit wait ceiling.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request).
    pub fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        self.state.require("request", &[SessionState::Ready])?;
        self.call(method, params, Some(timeout))
    }

    /// Sends a request with typed params and decodes the result.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus `SessionError::Codec` when either
    /// side fails to (de)serialise.
    pub fn request_typed<P, R>(&self, method: &str, params: &P) -> Result<R, SessionError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let result = self.request(method, serde_json::to_value(params)?)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Like [`request_typed`](Self::request_typed), treating a `null` result
    /// as `None`.
    ///
    /// # Errors
    ///
    /// As [`request_typed`](Self::request_typed).
    pub fn request_optional<P, R>(&self, method: &str, params: &P) -> Result<Option<R>, SessionError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        match self.request(method, serde_json::to_value(params)?)? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is `Ready`, and
    /// `SessionError::Transport` if the write fails.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        self.state.require("notify", &[SessionState::Ready])?;
        self.correlator
            .issue_notification(method, params)
            .inspect_err(|error| self.note_failure(error))
    }

    /// Installs the callback invoked for every inbound notification,
    /// replacing any previous one. It runs on the dispatch thread.
    pub fn register_notification_handler<F>(&self, handler: F)
    where
        F: FnMut(&str, &Value) + Send + 'static,
    {
        self.correlator.set_notification_handler(Box::new(handler));
    }

    /// Installs the callback that answers server-initiated requests.
    ///
    /// Without one, every server request is answered with a method-not-found
    /// error.
    pub fn register_request_handler<F>(&self, handler: F)
    where
        F: FnMut(&str, &Value) -> Result<Value, JsonRpcError> + Send + 'static,
    {
        self.correlator.set_request_handler(Box::new(handler));
    }

    /// Latest params received for `method`, optionally scoped to a document.
    #[must_use]
    pub fn latest_notification(&self, method: &str, topic: Option<&str>) -> Option<Value> {
        self.correlator
            .sink()
            .latest(&TopicKey::new(method, topic))
    }

    /// Blocks until a notification for `method` and `topic` has arrived, or
    /// `timeout` elapses.
    #[must_use]
    pub fn wait_for_notification(
        &self,
        method: &str,
        topic: Option<&str>,
        timeout: Duration,
    ) -> Option<Value> {
        self.correlator
            .sink()
            .wait_for(&TopicKey::new(method, topic), timeout)
    }

    /// Shuts down with the configured budget.
    ///
    /// # Errors
    ///
    /// As [`shutdown`](Self::shutdown).
    pub fn shutdown_default(&self) -> Result<ShutdownReport, SessionError> {
        self.shutdown(self.options.shutdown_timeout)
    }

    /// Ends the session within `timeout`.
    ///
    /// A `Ready` session first sends `shutdown` and `exit`. The input stream is
    /// then closed and a spawned server is given the rest of the budget to
    /// exit before it is killed. Pending requests fail with
    /// `ConnectionClosed`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` if a shutdown is already running.
    pub fn shutdown(&self, timeout: Duration) -> Result<ShutdownReport, SessionError> {
        let deadline = process::deadline_after(timeout);
        let previous_state = self.state.begin_shutdown()?;
        info!(target: SESSION_TARGET, server = %self.label, from = %previous_state, "shutting down");

        if previous_state == SessionState::Ready {
            let budget = deadline.saturating_duration_since(Instant::now());
            if let Err(error) = self.call("shutdown", Value::Null, Some(budget)) {
                debug!(target: SESSION_TARGET, operation = "shutdown", error = %error, "shutdown request failed");
            }
            if let Err(error) = self.correlator.issue_notification("exit", Value::Null) {
                debug!(target: SESSION_TARGET, operation = "exit", error = %error, "exit notification failed");
            }
        }

        if let Err(error) = self.correlator.close_writer() {
            debug!(target: SESSION_TARGET, error = %error, "failed to close server input");
        }

        let outcome = lock(&self.child)
            .take()
            .map(|mut child| process::wait_for_exit(&mut child, deadline));

        let workers = std::mem::take(&mut *lock(&self.workers));
        if let Some(dispatch) = workers.dispatch
            && let Some(exit) = process::join_until(dispatch, deadline, "dispatch")
        {
            debug!(target: SESSION_TARGET, ?exit, "dispatch loop finished");
        }
        if let Some(stderr) = workers.stderr {
            process::join_until(stderr, deadline, "stderr");
        }

        self.correlator.close_pending();
        self.correlator.sink().clear();
        self.state.close();

        let report = ShutdownReport {
            previous_state,
            exit_status: outcome.and_then(|outcome| outcome.status),
            forced: outcome.is_some_and(|outcome| outcome.forced),
        };
        info!(
            target: SESSION_TARGET,
            server = %self.label,
            status = ?report.exit_status,
            forced = report.forced,
            "session closed"
        );
        Ok(report)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(error) = self.correlator.close_writer() {
            debug!(target: SESSION_TARGET, error = %error, "failed to close server input on drop");
        }
        if let Some(mut child) = lock(&self.child).take() {
            process::kill_and_reap(&mut child);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.label)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

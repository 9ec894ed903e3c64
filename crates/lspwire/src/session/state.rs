//! Session lifecycle state.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::SESSION_TARGET;
use crate::errors::SessionError;

/// Lifecycle state of a [`Session`](super::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connected; the handshake has not begun.
    Unstarted,
    /// The `initialize` request is in flight or failed and may be retried.
    Handshaking,
    /// The handshake completed; requests and notifications are accepted.
    Ready,
    /// Shutdown is in progress.
    ShuttingDown,
    /// The connection is gone.
    Closed,
}

impl SessionState {
    /// Lower-case name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting down",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-protected state cell.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<SessionState>,
}

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Unstarted),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.lock()
    }

    /// Fails with `InvalidState` unless the current state is in `allowed`.
    pub(crate) fn require(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        let current = self.get();
        if allowed.contains(&current) {
            Ok(())
        } else {
            Err(SessionError::invalid_state(operation, current))
        }
    }

    /// Moves to `next` if the current state is in `allowed`.
    pub(crate) fn transition(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
        next: SessionState,
    ) -> Result<SessionState, SessionError> {
        let mut state = self.lock();
        let previous = *state;
        if !allowed.contains(&previous) {
            return Err(SessionError::invalid_state(operation, previous));
        }
        *state = next;
        drop(state);
        if previous != next {
            debug!(target: SESSION_TARGET, from = %previous, to = %next, "session state changed");
        }
        Ok(previous)
    }

    /// Enters `ShuttingDown` from any state but `ShuttingDown` itself.
    pub(crate) fn begin_shutdown(&self) -> Result<SessionState, SessionError> {
        self.transition(
            "shutdown",
            &[
                SessionState::Unstarted,
                SessionState::Handshaking,
                SessionState::Ready,
                SessionState::Closed,
            ],
            SessionState::ShuttingDown,
        )
    }

    /// Marks the connection as lost unless an orderly shutdown owns it.
    ///
    /// Returns true when the state changed.
    pub(crate) fn connection_lost(&self) -> bool {
        let mut state = self.lock();
        let previous = *state;
        if matches!(previous, SessionState::ShuttingDown | SessionState::Closed) {
            return false;
        }
        *state = SessionState::Closed;
        drop(state);
        debug!(target: SESSION_TARGET, from = %previous, "connection lost");
        true
    }

    pub(crate) fn close(&self) {
        *self.lock() = SessionState::Closed;
    }
}

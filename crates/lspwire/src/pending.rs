//! Registry of in-flight requests awaiting a response.
//!
//! Each entry maps one identifier to a single-use channel. The dispatch thread
//! resolves entries as responses arrive; callers block on the receiving half.
//! Closing the table resolves every remaining entry and refuses new ones, so no
//! caller can wait on a connection that is already gone.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

use crate::jsonrpc::RequestId;

/// Why an entry could not be registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// The table was closed because the connection terminated.
    #[error("pending request table is closed")]
    Closed,
    /// An entry for this identifier already exists.
    #[error("request id {0} is already pending")]
    Duplicate(RequestId),
}

struct TableState<T, E> {
    entries: HashMap<RequestId, SyncSender<Result<T, E>>>,
    closed: bool,
}

/// Identifier-keyed table of one-shot completion handles.
pub struct PendingTable<T, E> {
    state: Mutex<TableState<T, E>>,
}

impl<T, E> Default for PendingTable<T, E> {
    fn default() -> Self {
        Self {
            state: Mutex::new(TableState {
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }
}

impl<T, E> PendingTable<T, E> {
    /// Creates an empty, open table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState<T, E>> {
        // Recover from poisoning so teardown can still drain the table.
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Registers an entry for `id` and returns the handle its caller waits on.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Closed`] once the table has been closed and
    /// [`RegisterError::Duplicate`] if `id` is already pending.
    pub fn register(&self, id: RequestId) -> Result<PendingReceiver<T, E>, RegisterError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RegisterError::Closed);
        }
        if state.entries.contains_key(&id) {
            return Err(RegisterError::Duplicate(id));
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        state.entries.insert(id, sender);
        Ok(PendingReceiver { receiver })
    }

    /// Removes the entry for `id` and delivers `outcome` to it.
    ///
    /// Returns `false` when no entry exists, for example because the caller
    /// already abandoned it.
    pub fn resolve(&self, id: RequestId, outcome: Result<T, E>) -> bool {
        let sender = self.lock().entries.remove(&id);
        match sender {
            // A dropped receiver means the caller gave up; nothing to deliver.
            Some(sender) => {
                drop(sender.try_send(outcome));
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` without resolving it.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Closes the table and resolves every remaining entry with `error()`.
    ///
    /// Returns the number of entries that were drained.
    pub fn close_with(&self, error: impl Fn() -> E) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.closed = true;
            state.entries.drain().collect()
        };
        let count = drained.len();
        for (_, sender) in drained {
            drop(sender.try_send(Err(error())));
        }
        count
    }

    /// Whether [`close_with`](Self::close_with) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of unresolved entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when no request is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a bounded wait on a pending entry.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<T, E> {
    /// The entry was resolved.
    Resolved(Result<T, E>),
    /// The wait expired first; the entry is still registered.
    TimedOut,
    /// The entry was removed without being resolved.
    Abandoned,
}

/// Receiving half of a pending entry.
#[derive(Debug)]
pub struct PendingReceiver<T, E> {
    receiver: Receiver<Result<T, E>>,
}

impl<T, E> PendingReceiver<T, E> {
    /// Blocks until the entry is resolved.
    ///
    /// Returns `None` if the entry was removed without resolution.
    pub fn wait(self) -> Option<Result<T, E>> {
        self.receiver.recv().ok()
    }

    /// Blocks until the entry is resolved or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome<T, E> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => WaitOutcome::Resolved(outcome),
            Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::Abandoned,
        }
    }
}

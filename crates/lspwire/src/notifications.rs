//! Routing of unsolicited peer messages.
//!
//! [`NotificationSink`] remembers the latest notification per topic, so
//! callers can read e.g. the current diagnostics for a document without
//! subscribing. The handler slots hold at most one callback each and are
//! invoked on the dispatch thread.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::jsonrpc::JsonRpcError;

/// Callback invoked once per inbound notification with `(method, params)`.
pub type NotificationHandler = Box<dyn FnMut(&str, &Value) + Send>;

/// Callback answering a server-initiated request.
pub type RequestHandler = Box<dyn FnMut(&str, &Value) -> Result<Value, JsonRpcError> + Send>;

/// Key under which the latest notification is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    /// Notification method.
    pub method: String,
    /// Document the notification concerns, when it names one.
    pub topic: Option<String>,
}

impl TopicKey {
    /// Builds a key from a method and optional topic.
    #[must_use]
    pub fn new(method: impl Into<String>, topic: Option<&str>) -> Self {
        Self {
            method: method.into(),
            topic: topic.map(str::to_owned),
        }
    }

    /// Derives the key for a notification from `params.uri` or
    /// `params.textDocument.uri`.
    #[must_use]
    pub fn for_notification(method: &str, params: &Value) -> Self {
        let topic = params
            .get("uri")
            .or_else(|| params.get("textDocument").and_then(|doc| doc.get("uri")))
            .and_then(Value::as_str);
        Self::new(method, topic)
    }
}

/// Last-value-wins store of notifications keyed by [`TopicKey`].
#[derive(Default)]
pub struct NotificationSink {
    latest: Mutex<HashMap<TopicKey, Value>>,
    arrived: Condvar,
}

impl NotificationSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TopicKey, Value>> {
        self.latest
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Stores `params`, replacing any earlier value for the same key.
    pub fn record(&self, method: &str, params: &Value) {
        let key = TopicKey::for_notification(method, params);
        self.lock().insert(key, params.clone());
        self.arrived.notify_all();
    }

    /// Latest params stored under `key`.
    #[must_use]
    pub fn latest(&self, key: &TopicKey) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Removes and returns the value under `key`.
    pub fn take(&self, key: &TopicKey) -> Option<Value> {
        self.lock().remove(key)
    }

    /// Blocks until a value exists under `key` or `timeout` elapses.
    #[must_use]
    pub fn wait_for(&self, key: &TopicKey, timeout: Duration) -> Option<Value> {
        let guard = self.lock();
        let (guard, _) = self
            .arrived
            .wait_timeout_while(guard, timeout, |latest| !latest.contains_key(key))
            .unwrap_or_else(|poison| poison.into_inner());
        guard.get(key).cloned()
    }

    /// Forgets every stored notification.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A slot holding at most one callback.
///
/// The callback is taken out of the slot while it runs, so it may install a
/// replacement for itself without deadlocking.
pub struct HandlerSlot<H> {
    handler: Mutex<Option<H>>,
}

impl<H> Default for HandlerSlot<H> {
    fn default() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }
}

impl<H> HandlerSlot<H> {
    fn lock(&self) -> MutexGuard<'_, Option<H>> {
        self.handler
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Installs `handler`, replacing any previous one.
    pub fn set(&self, handler: H) {
        *self.lock() = Some(handler);
    }

    /// Removes the installed handler.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// True when a handler is installed.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs the installed handler, returning `None` when the slot is empty.
    pub fn with_handler<R>(&self, call: impl FnOnce(&mut H) -> R) -> Option<R> {
        let mut handler = self.lock().take()?;
        let result = call(&mut handler);
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(handler);
        }
        Some(result)
    }
}

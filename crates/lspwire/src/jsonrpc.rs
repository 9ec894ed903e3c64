//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier type for client-issued requests.
pub type RequestId = i64;

/// Protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error code for an unsupported method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Standard JSON-RPC error code for an internal failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// Drops `null` params; JSON-RPC only permits structured values there.
fn structured(params: Value) -> Option<Value> {
    match params {
        Value::Null => None,
        other => Some(other),
    }
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// Request identifier allocated by the session.
    pub id: RequestId,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request with the given identifier.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params: structured(params),
        }
    }
}

/// A JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params: structured(params),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Builds an error object without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The reply sent for server requests nobody handles.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    /// Interprets a raw `error` member, tolerating peers that send a bare
    /// string or an otherwise malformed object.
    fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(error) => error,
            Err(_) => Self {
                code: INTERNAL_ERROR,
                message: value
                    .as_str()
                    .map_or_else(|| value.to_string(), str::to_owned),
                data: Some(value),
            },
        }
    }
}

/// A reply to a server-initiated request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// Identifier chosen by the peer, echoed verbatim.
    pub id: Value,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcReply {
    /// Builds a reply from a handler outcome.
    #[must_use]
    pub fn new(id: Value, outcome: Result<Value, JsonRpcError>) -> Self {
        match outcome {
            Ok(result) => Self {
                jsonrpc: JSONRPC_VERSION,
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                jsonrpc: JSONRPC_VERSION,
                id,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Distinguishes an absent member from one that is present but `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    error: Option<Value>,
}

/// An inbound message classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Carries an `id` and a `result` or `error`.
    Response {
        /// The id as sent; only integer ids can match a pending request.
        id: Value,
        /// Success payload or error object.
        outcome: Result<Value, JsonRpcError>,
    },
    /// Carries `id` and `method`: the peer expects a reply.
    ServerRequest {
        /// Identifier chosen by the peer.
        id: Value,
        /// Requested method.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
    /// Carries `method` without `id`.
    Notification {
        /// Notification method.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
    /// A JSON object matching none of the shapes above.
    Unrecognized(Value),
}

impl IncomingMessage {
    /// Parses and classifies a payload.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the payload is not a JSON object.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        let raw: RawMessage = serde_json::from_value(value.clone())?;

        let message = match raw {
            RawMessage {
                id: Some(id),
                result,
                error: Some(error),
                ..
            } if result.is_none() || error != Value::Null => Self::Response {
                id,
                outcome: Err(JsonRpcError::from_value(error)),
            },
            RawMessage {
                id: Some(id),
                result: Some(result),
                ..
            } => Self::Response {
                id,
                outcome: Ok(result),
            },
            RawMessage {
                id: Some(id),
                method: Some(method),
                params,
                ..
            } => Self::ServerRequest {
                id,
                method,
                params: params.unwrap_or(Value::Null),
            },
            RawMessage {
                id: None,
                method: Some(method),
                params,
                ..
            } => Self::Notification {
                method,
                params: params.unwrap_or(Value::Null),
            },
            _ => Self::Unrecognized(value),
        };
        Ok(message)
    }
}

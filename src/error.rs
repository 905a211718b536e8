//! Error types surfaced by the client.
//!
//! Request-level failures reach the caller of `request`/`publish`/`subscribe`
//! as [`ClientError`]. Transport failures never do: they become lifecycle
//! notifications and the session reconnects on its own.

use serde_json::Value;

/// Errors returned to callers of [`crate::Client`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No response arrived within the per-request or global deadline.
    #[error("request timed out")]
    Timeout,
    /// Every correlation identifier is taken by a pending request.
    #[error("too many pending requests")]
    MaxRequest,
    /// The operation needs an open transport and there is none.
    #[error("not connected")]
    NotConnected,
    /// The peer answered with `Status=false`; carries the response data.
    #[error("request rejected: {0}")]
    Rejected(Value),
    /// The outbound buffer is full and the overflow policy refuses new messages.
    #[error("outbound buffer full")]
    OutboxFull,
    /// The message was evicted from the outbound buffer before it was written.
    #[error("dropped from outbound buffer")]
    Dropped,
    /// None of the given topic names passed validation.
    #[error("no valid topic given")]
    NoValidTopic,
    /// The session task has stopped.
    #[error("client closed")]
    Closed,
}

impl ClientError {
    /// The server-provided payload of a rejected request, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<&Value> {
        match self {
            Self::Rejected(data) => Some(data),
            _ => None,
        }
    }
}

/// Errors produced while reading [`crate::ClientConfig`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `CASTLE_CODEC` was neither `binary` nor `json`.
    #[error("invalid codec: {0} (expected binary or json)")]
    InvalidCodec(String),
    /// `CASTLE_OVERFLOW` was neither `drop-oldest` nor `reject-new`.
    #[error("invalid overflow policy: {0} (expected drop-oldest or reject-new)")]
    InvalidOverflow(String),
}

/// Errors produced by a [`crate::transport::Connector`].
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Opening the transport failed.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The connector can no longer produce links.
    #[error("connector closed")]
    Closed,
}

/// How the server answered one login attempt.
///
/// A failed login whose payload is a string is the server assigning the
/// client an address; the session adopts it and logs in again.
#[derive(Clone, Debug, PartialEq)]
pub enum LoginOutcome {
    Accepted,
    AddressAssigned(String),
    Rejected(Value),
}

impl LoginOutcome {
    /// Classify a login `Response` by its `Status` and `Data`.
    #[must_use]
    pub fn from_response(status: bool, data: Value) -> Self {
        match (status, data) {
            (true, _) => Self::Accepted,
            (false, Value::String(address)) => Self::AddressAssigned(address),
            (false, data) => Self::Rejected(data),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

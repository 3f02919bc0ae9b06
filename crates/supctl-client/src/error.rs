//! Client failure taxonomy.
//!
//! Every public operation fails with exactly one of these kinds: local
//! validation, transport (connect, mid-flight, timeout), protocol (non-2xx
//! status), or decode (malformed reply, daemon fault). Nothing is retried
//! automatically at this layer.

use std::time::Duration;

use crate::xmlrpc::XmlRpcError;

/// Errors surfaced by [`SupervisorClient`](crate::SupervisorClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Argument rejected locally, before any I/O was issued.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The configured server URL could not be parsed, or names a scheme
    /// other than `http`, `https`, or `unix`.
    #[error("invalid server URL `{url}`: {reason}")]
    BadUrl { url: String, reason: String },

    /// The underlying connection could not be established.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        source: std::io::Error,
    },

    /// The connection was established but the exchange failed mid-flight.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The call did not complete within the configured timeout. The
    /// underlying connection is released when this is returned.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The daemon answered with a non-success HTTP status. The response
    /// body is closed before this is surfaced; the status line is kept
    /// verbatim for diagnostics.
    #[error("unexpected response status: {status}")]
    Status { status: String },

    /// The daemon reported an explicit RPC fault.
    #[error("daemon fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// The response body was not a well-formed reply document.
    #[error("failed to decode reply: {0}")]
    Decode(XmlRpcError),
}

impl From<XmlRpcError> for ClientError {
    fn from(err: XmlRpcError) -> Self {
        match err {
            XmlRpcError::Fault { code, message } => ClientError::Fault { code, message },
            other => ClientError::Decode(other),
        }
    }
}

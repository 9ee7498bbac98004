//! Error taxonomy (§7): JSON-RPC error codes mapped onto a small, closed set
//! of kinds the engine actually needs to distinguish, plus the three
//! transport-local kinds that never appear on the wire.

use crate::jsonrpc::{JsonRpcError, JsonRpcErrorCode};

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error classification. Three of these (`ConnectionClosed`, `RequestTimeout`,
/// `Cancelled`) are local-only: they resume an awaiter or abort a loop but are
/// never serialized into a `JsonRpcError` unless a remote peer reported them
/// first (§7, "Propagation policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorKind {
    /// Malformed JSON or JSON-RPC shape (-32700).
    ParseError,
    /// Structurally valid but semantically forbidden (-32600).
    InvalidRequest,
    /// No handler registered, or strict-mode capability gate (-32601).
    MethodNotFound,
    /// Parameters failed validation (-32602).
    InvalidParams,
    /// Handler failure or engine invariant violation (-32603).
    InternalError,
    /// Transport-local: the connection was closed or disconnected.
    ConnectionClosed,
    /// Transport-local: a request's timeout elapsed before a response arrived.
    RequestTimeout,
    /// Transport-local: the request was cancelled by the caller or the peer.
    Cancelled,
}

impl McpErrorKind {
    /// Whether this kind ever appears on the wire as a `JsonRpcError`.
    pub fn is_wire_error(self) -> bool {
        !matches!(
            self,
            Self::ConnectionClosed | Self::RequestTimeout | Self::Cancelled
        )
    }

    /// The JSON-RPC code for wire-visible kinds. Transport-local kinds map to
    /// `InternalError`'s code as a fallback should a caller serialize one
    /// anyway (this only happens if a remote peer reports cancellation or
    /// timeout as an actual error object, which this crate then reinterprets
    /// locally rather than re-emitting).
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => JsonRpcErrorCode::ParseError.code(),
            Self::InvalidRequest => JsonRpcErrorCode::InvalidRequest.code(),
            Self::MethodNotFound => JsonRpcErrorCode::MethodNotFound.code(),
            Self::InvalidParams => JsonRpcErrorCode::InvalidParams.code(),
            Self::InternalError
            | Self::ConnectionClosed
            | Self::RequestTimeout
            | Self::Cancelled => JsonRpcErrorCode::InternalError.code(),
        }
    }
}

/// An engine-level error. Carries only a kind and a short message — no
/// backtrace, no source chain placed on the wire — so it is always safe to
/// display to a user or log verbatim (§7, "User-visible behavior").
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct McpError {
    /// The error classification.
    pub kind: McpErrorKind,
    /// A short, display-safe message.
    pub message: String,
}

impl McpError {
    /// Construct an error of the given kind.
    pub fn new(kind: McpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand constructors, one per kind.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::ParseError, message)
    }

    /// `InvalidRequest` shorthand.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::InvalidRequest, message)
    }

    /// `MethodNotFound` shorthand.
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::MethodNotFound, message)
    }

    /// `InvalidParams` shorthand.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::InvalidParams, message)
    }

    /// `InternalError` shorthand. Wraps an underlying error's `Display`, not
    /// its `Debug`, so stack-trace-shaped details never leak onto the wire.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::InternalError, message)
    }

    /// `ConnectionClosed` shorthand.
    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::ConnectionClosed, message)
    }

    /// `RequestTimeout` shorthand.
    pub fn request_timeout(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::RequestTimeout, message)
    }

    /// `Cancelled` shorthand.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(McpErrorKind::Cancelled, message)
    }

    /// Convert to a wire `JsonRpcError`. Transport-local kinds convert using
    /// `InternalError`'s code, since they should never reach this path in
    /// practice (callers are expected to branch on `kind.is_wire_error()`
    /// first, e.g. a timeout produces a `cancelled` notification, not a
    /// JSON-RPC error response).
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.kind.code(),
            message: self.message.clone(),
            data: None,
        }
    }
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        let kind = match JsonRpcErrorCode::from(err.code) {
            JsonRpcErrorCode::ParseError => McpErrorKind::ParseError,
            JsonRpcErrorCode::InvalidRequest => McpErrorKind::InvalidRequest,
            JsonRpcErrorCode::MethodNotFound => McpErrorKind::MethodNotFound,
            JsonRpcErrorCode::InvalidParams => McpErrorKind::InvalidParams,
            JsonRpcErrorCode::InternalError | JsonRpcErrorCode::ApplicationError(_) => {
                McpErrorKind::InternalError
            }
        };
        Self::new(kind, err.message)
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_error_round_trip_preserves_code() {
        let err = McpError::method_not_found("no handler for tools/call");
        let wire = err.to_jsonrpc_error();
        assert_eq!(wire.code, JsonRpcErrorCode::MethodNotFound.code());

        let back: McpError = wire.into();
        assert_eq!(back.kind, McpErrorKind::MethodNotFound);
        assert_eq!(back.message, "no handler for tools/call");
    }

    #[test]
    fn transport_local_kinds_are_not_wire_errors() {
        assert!(!McpErrorKind::ConnectionClosed.is_wire_error());
        assert!(!McpErrorKind::RequestTimeout.is_wire_error());
        assert!(!McpErrorKind::Cancelled.is_wire_error());
        assert!(McpErrorKind::InvalidRequest.is_wire_error());
    }

    #[test]
    fn application_error_code_round_trips_as_internal_kind() {
        let wire = JsonRpcError {
            code: -32001,
            message: "tool not found".into(),
            data: None,
        };
        let err: McpError = wire.into();
        assert_eq!(err.kind, McpErrorKind::InternalError);
    }

    #[test]
    fn display_never_includes_debug_formatting() {
        let err = McpError::internal("handler panicked");
        let shown = err.to_string();
        assert!(shown.contains("handler panicked"));
        assert!(!shown.contains("Backtrace"));
    }
}

//! HTTP-facing error taxonomy (§6): every status code the validation
//! pipeline and routing layer can produce.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mcp_protocol::{
    JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, McpError, McpErrorKind, ResponseId,
};

/// An error the HTTP layer produces before (or instead of) handing a
/// request to the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpTransportError {
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("missing or invalid Accept header")]
    NotAcceptable,
    #[error("missing or invalid Content-Type header")]
    UnsupportedMediaType,
    #[error("unsupported protocol version")]
    UnsupportedProtocolVersion,
    #[error("missing Mcp-Session-Id header")]
    MissingSession,
    #[error("unknown or terminated session")]
    UnknownSession,
    #[error("a standalone stream is already open for this session")]
    StandaloneConflict,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("Host header not permitted")]
    HostDenied,
    #[error("Origin header not permitted")]
    OriginDenied,
    #[error("malformed JSON-RPC payload: {0}")]
    ParseError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl HttpTransportError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AlreadyInitialized
            | Self::MissingSession
            | Self::ParseError(_)
            | Self::UnsupportedProtocolVersion => StatusCode::BAD_REQUEST,
            Self::OriginDenied => StatusCode::FORBIDDEN,
            Self::UnknownSession => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::StandaloneConflict => StatusCode::CONFLICT,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::HostDenied => StatusCode::MISDIRECTED_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `McpErrorKind` this maps onto for the wire-level error body, so an
    /// HTTP-layer rejection is indistinguishable from one the engine itself
    /// would have produced for the same condition.
    fn kind(&self) -> McpErrorKind {
        match self {
            Self::ParseError(_) => McpErrorKind::ParseError,
            Self::Internal(_) => McpErrorKind::InternalError,
            Self::AlreadyInitialized
            | Self::NotAcceptable
            | Self::UnsupportedMediaType
            | Self::UnsupportedProtocolVersion
            | Self::MissingSession
            | Self::UnknownSession
            | Self::StandaloneConflict
            | Self::MethodNotAllowed
            | Self::HostDenied
            | Self::OriginDenied => McpErrorKind::InvalidRequest,
        }
    }
}

impl IntoResponse for HttpTransportError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = McpError::new(self.kind(), self.to_string()).to_jsonrpc_error();
        let body = JsonRpcResponse {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::null(),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_protocol::JsonRpcErrorCode;

    #[test]
    fn status_codes_match_the_documented_surface() {
        assert_eq!(HttpTransportError::AlreadyInitialized.status(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpTransportError::OriginDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(HttpTransportError::UnknownSession.status(), StatusCode::NOT_FOUND);
        assert_eq!(HttpTransportError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(HttpTransportError::NotAcceptable.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(HttpTransportError::StandaloneConflict.status(), StatusCode::CONFLICT);
        assert_eq!(HttpTransportError::UnsupportedMediaType.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(HttpTransportError::HostDenied.status(), StatusCode::MISDIRECTED_REQUEST);
    }

    #[tokio::test]
    async fn error_response_body_is_a_null_id_jsonrpc_error() {
        let response = HttpTransportError::UnknownSession.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["jsonrpc"], "2.0");
        assert!(body["id"].is_null());
        assert_eq!(body["error"]["code"], JsonRpcErrorCode::InvalidRequest.code());
        assert_eq!(body["error"]["message"], "unknown or terminated session");
    }

    #[tokio::test]
    async fn parse_error_and_internal_error_keep_their_own_codes() {
        let parse_response = HttpTransportError::ParseError("bad json".into()).into_response();
        let bytes = axum::body::to_bytes(parse_response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], JsonRpcErrorCode::ParseError.code());

        let internal_response = HttpTransportError::Internal("handler panicked".into()).into_response();
        let bytes = axum::body::to_bytes(internal_response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], JsonRpcErrorCode::InternalError.code());
    }
}

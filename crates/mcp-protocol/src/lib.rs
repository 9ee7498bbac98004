//! Wire types, error taxonomy, and capability model for the MCP core runtime.
//!
//! This crate has no opinion about transports or scheduling; it defines the
//! data that flows between peers and the pure functions (version negotiation,
//! message classification) that don't need a running engine to make sense of.

pub mod capabilities;
pub mod error;
pub mod jsonrpc;
pub mod lifecycle;
pub mod meta;

pub use capabilities::{CapabilityName, ClientCapabilities, ServerCapabilities};
pub use error::{McpError, McpErrorKind, Result};
pub use jsonrpc::{
    ClassifiedItem, ClassifiedMessage, ClassifyError, JsonRpcBatch, JsonRpcError, JsonRpcErrorCode,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload,
    JsonRpcVersion, RequestId, ResponseId, classify, classify_value,
};
pub use lifecycle::{ClientInfo, InitializeParams, InitializeResult, ServerInfo, negotiate_version};
pub use meta::{ProgressToken, RequestMeta};

//! JSON-RPC 2.0 wire types and the message classifier.
//!
//! The classifier (see [`classify`]) is the entry point the peer engine calls
//! on every inbound payload: it decides whether a blob of bytes is a request,
//! a notification, a response, or a batch, without committing to a concrete
//! method's parameter/result types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC version marker; serializes to/deserializes from the literal `"2.0"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid jsonrpc version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier: either a 64-bit integer or a string.
///
/// Unique among in-flight outbound requests per peer (§3). Integers and
/// strings hash distinctly even if their textual forms coincide, matching
/// JSON-RPC's own typed-id semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        Self::Number(n as i64)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// JSON-RPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Method name.
    pub method: String,
    /// Request parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request identifier.
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a new request.
    pub fn new(method: impl Into<String>, params: Option<Value>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Create a request with no parameters.
    pub fn without_params(method: impl Into<String>, id: impl Into<RequestId>) -> Self {
        Self::new(method, None, id)
    }

    /// Create a request, serializing typed parameters.
    pub fn with_params<P: Serialize>(
        method: impl Into<String>,
        params: P,
        id: impl Into<RequestId>,
    ) -> serde_json::Result<Self> {
        Ok(Self::new(method, Some(serde_json::to_value(params)?), id))
    }

    /// Read the request's `_meta.progressToken`, if present.
    pub fn progress_token(&self) -> Option<crate::meta::ProgressToken> {
        crate::meta::RequestMeta::from_params(self.params.as_ref()).progress_token()
    }
}

/// JSON-RPC notification: a method call with no id and no expected response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Method name.
    pub method: String,
    /// Notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }

    /// Create a notification with no parameters.
    pub fn without_params(method: impl Into<String>) -> Self {
        Self::new(method, None)
    }

    /// Create a notification, serializing typed parameters.
    pub fn with_params<P: Serialize>(
        method: impl Into<String>,
        params: P,
    ) -> serde_json::Result<Self> {
        Ok(Self::new(method, Some(serde_json::to_value(params)?)))
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable message. Never contains stack traces or secrets.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes plus the application-defined escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// -32700
    ParseError,
    /// -32600
    InvalidRequest,
    /// -32601
    MethodNotFound,
    /// -32602
    InvalidParams,
    /// -32603
    InternalError,
    /// Any other code, including the MCP-specific range.
    ApplicationError(i32),
}

impl JsonRpcErrorCode {
    /// The numeric code.
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ApplicationError(code) => code,
        }
    }

    /// The standard short message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ApplicationError(_) => "Application error",
        }
    }
}

impl From<i32> for JsonRpcErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            other => Self::ApplicationError(other),
        }
    }
}

impl From<JsonRpcErrorCode> for JsonRpcError {
    fn from(code: JsonRpcErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: None,
        }
    }
}

/// The response payload: mutually exclusive result or error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful result.
    Success {
        /// The result value.
        result: Value,
    },
    /// Error result.
    Error {
        /// The error object.
        error: JsonRpcError,
    },
}

/// Response id. `None` only for parse errors, whose id could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Wrap a known request id.
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// The null id used for parse-error responses.
    pub fn null() -> Self {
        Self(None)
    }

    /// Borrow the request id, if any.
    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }

    /// Whether this is the null id.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

/// JSON-RPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// The result or error.
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// The id this response answers, or null for an unrecoverable parse error.
    pub id: ResponseId,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId::from_request(id),
        }
    }

    /// Build an error response for a known request id.
    pub fn error_response(error: JsonRpcError, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::from_request(id),
        }
    }

    /// Build a parse-error response with a null id.
    pub fn parse_error(message: impl Into<Option<String>>) -> Self {
        let error = JsonRpcError {
            code: JsonRpcErrorCode::ParseError.code(),
            message: message
                .into()
                .unwrap_or_else(|| JsonRpcErrorCode::ParseError.message().to_string()),
            data: None,
        };
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::null(),
        }
    }

    /// Whether this is a success response.
    pub fn is_success(&self) -> bool {
        matches!(self.payload, JsonRpcResponsePayload::Success { .. })
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, JsonRpcResponsePayload::Error { .. })
    }

    /// The result, if this is a success response.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            JsonRpcResponsePayload::Success { result } => Some(result),
            JsonRpcResponsePayload::Error { .. } => None,
        }
    }

    /// The error, if this is an error response.
    pub fn error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            JsonRpcResponsePayload::Success { .. } => None,
            JsonRpcResponsePayload::Error { error } => Some(error),
        }
    }

    /// The request id this answers, absent only for parse errors.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.id.as_request_id()
    }

    /// A response whose result embeds `task.taskId` (a string) signals that
    /// the server migrated a request's progress token onto a background task
    /// (§4.5). Returns that task id.
    pub fn task_id(&self) -> Option<&str> {
        self.result()?.get("task")?.get("taskId")?.as_str()
    }
}

/// A batch of requests/notifications (outbound) or responses (inbound).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonRpcBatch<T> {
    /// Batch items, in wire order.
    pub items: Vec<T>,
}

impl<T> JsonRpcBatch<T> {
    /// Wrap a vector of items as a batch.
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// An empty batch.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Append an item.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the items by reference.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for JsonRpcBatch<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> From<Vec<T>> for JsonRpcBatch<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

/// A single classified inbound item: a request or a notification.
///
/// Distinct from [`JsonRpcMessage`] because classification only needs to
/// extract routing information (id, method), not the full typed envelope —
/// see [`classify`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifiedItem {
    /// An inbound request.
    Request(JsonRpcRequest),
    /// An inbound notification.
    Notification(JsonRpcNotification),
}

/// The result of classifying one raw JSON-RPC payload (§4.1).
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ClassifiedMessage {
    /// A single request.
    Request(JsonRpcRequest),
    /// A single notification.
    Notification(JsonRpcNotification),
    /// A single response.
    Response(JsonRpcResponse),
    /// A batch of requests/notifications.
    Batch(Vec<ClassifiedItem>),
    /// A batch of responses (the reply to an outbound batch).
    ResponseBatch(Vec<JsonRpcResponse>),
}

/// Classify a raw JSON-RPC payload per §4.1's contract.
///
/// A message is a response iff it has `id` and (`result` xor `error`) and no
/// `method`; a request iff it has `id` and `method`; a notification iff it
/// has `method` and no `id`. A JSON array classifies element-wise: if every
/// element is a request/notification it's a `Batch`; if every element is a
/// response it's a `ResponseBatch`. Anything else — including an empty
/// array, or a mixed array — is a classification failure; callers map that
/// to `InvalidRequest` for empty batches and `ParseError` otherwise.
pub fn classify(raw: &[u8]) -> Result<ClassifiedMessage, ClassifyError> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| ClassifyError::Parse(e.to_string()))?;
    classify_value(value)
}

/// Same as [`classify`] but operating on an already-parsed [`Value`].
pub fn classify_value(value: Value) -> Result<ClassifiedMessage, ClassifyError> {
    match value {
        Value::Array(items) => classify_array(items),
        single => classify_single(single).map(|item| match item {
            ClassifiedSingle::Request(r) => ClassifiedMessage::Request(r),
            ClassifiedSingle::Notification(n) => ClassifiedMessage::Notification(n),
            ClassifiedSingle::Response(r) => ClassifiedMessage::Response(r),
        }),
    }
}

enum ClassifiedSingle {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

fn classify_single(value: Value) -> Result<ClassifiedSingle, ClassifyError> {
    let obj = value.as_object().ok_or(ClassifyError::NotAnObject)?;
    let has_id = obj.contains_key("id");
    let has_method = obj.contains_key("method");
    let has_result_or_error = obj.contains_key("result") || obj.contains_key("error");

    if has_id && has_method {
        let req: JsonRpcRequest =
            serde_json::from_value(value).map_err(|e| ClassifyError::Parse(e.to_string()))?;
        Ok(ClassifiedSingle::Request(req))
    } else if has_method && !has_id {
        let notif: JsonRpcNotification =
            serde_json::from_value(value).map_err(|e| ClassifyError::Parse(e.to_string()))?;
        Ok(ClassifiedSingle::Notification(notif))
    } else if has_id && has_result_or_error && !has_method {
        let resp: JsonRpcResponse =
            serde_json::from_value(value).map_err(|e| ClassifyError::Parse(e.to_string()))?;
        Ok(ClassifiedSingle::Response(resp))
    } else {
        Err(ClassifyError::Shape)
    }
}

fn classify_array(items: Vec<Value>) -> Result<ClassifiedMessage, ClassifyError> {
    if items.is_empty() {
        return Err(ClassifyError::EmptyBatch);
    }

    let classified: Vec<ClassifiedSingle> = items
        .into_iter()
        .map(classify_single)
        .collect::<Result<_, _>>()?;

    if classified
        .iter()
        .all(|c| matches!(c, ClassifiedSingle::Response(_)))
    {
        let responses = classified
            .into_iter()
            .map(|c| match c {
                ClassifiedSingle::Response(r) => r,
                _ => unreachable!(),
            })
            .collect();
        return Ok(ClassifiedMessage::ResponseBatch(responses));
    }

    if classified
        .iter()
        .any(|c| matches!(c, ClassifiedSingle::Response(_)))
    {
        return Err(ClassifyError::MixedBatch);
    }

    let items = classified
        .into_iter()
        .map(|c| match c {
            ClassifiedSingle::Request(r) => ClassifiedItem::Request(r),
            ClassifiedSingle::Notification(n) => ClassifiedItem::Notification(n),
            ClassifiedSingle::Response(_) => unreachable!(),
        })
        .collect();
    Ok(ClassifiedMessage::Batch(items))
}

/// Why [`classify`] failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifyError {
    /// The payload wasn't valid JSON, or a matched shape didn't deserialize.
    #[error("parse error: {0}")]
    Parse(String),
    /// The payload's top level wasn't an object or array.
    #[error("payload is not a JSON object")]
    NotAnObject,
    /// The object has neither the request, notification, nor response shape.
    #[error("message has neither request, notification, nor response shape")]
    Shape,
    /// `[]` — specified as InvalidRequest, not a generic parse failure.
    #[error("batch array is empty")]
    EmptyBatch,
    /// An array mixed responses with requests/notifications.
    #[error("batch mixes responses with requests/notifications")]
    MixedBatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jsonrpc_version_round_trips() {
        let json = serde_json::to_string(&JsonRpcVersion).unwrap();
        assert_eq!(json, "\"2.0\"");
        let parsed: JsonRpcVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JsonRpcVersion);
    }

    #[test]
    fn jsonrpc_version_rejects_other_values() {
        let err = serde_json::from_str::<JsonRpcVersion>("\"1.0\"").unwrap_err();
        assert!(err.to_string().contains("invalid jsonrpc version"));
    }

    #[test]
    fn request_creation() {
        let request = JsonRpcRequest::new("ping", Some(json!({"a": 1})), RequestId::from(7));
        assert_eq!(request.method, "ping");
        assert!(request.params.is_some());
    }

    #[test]
    fn response_success_and_error() {
        let ok = JsonRpcResponse::success(json!({"x": 1}), RequestId::from("id-1"));
        assert!(ok.is_success());
        assert!(ok.result().is_some());

        let err = JsonRpcResponse::error_response(
            JsonRpcErrorCode::MethodNotFound.into(),
            RequestId::from("id-1"),
        );
        assert!(err.is_error());
        assert!(err.error().is_some());
    }

    #[test]
    fn parse_error_has_null_id() {
        let resp = JsonRpcResponse::parse_error(Some("bad json".into()));
        assert!(resp.id.is_null());
        assert_eq!(resp.error().unwrap().code, JsonRpcErrorCode::ParseError.code());
    }

    #[test]
    fn task_id_extraction() {
        let resp = JsonRpcResponse::success(
            json!({"task": {"taskId": "t-1"}, "content": []}),
            RequestId::from(1),
        );
        assert_eq!(resp.task_id(), Some("t-1"));

        let plain = JsonRpcResponse::success(json!({"content": []}), RequestId::from(1));
        assert_eq!(plain.task_id(), None);
    }

    #[test]
    fn classify_request_notification_response() {
        let req = classify(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(matches!(req, ClassifiedMessage::Request(_)));

        let notif = classify(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(notif, ClassifiedMessage::Notification(_)));

        let resp = classify(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(resp, ClassifiedMessage::Response(_)));

        let err_resp = classify(br#"{"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"x"}}"#)
            .unwrap();
        assert!(matches!(err_resp, ClassifiedMessage::Response(_)));
    }

    #[test]
    fn classify_batches() {
        let batch = classify(br#"[{"jsonrpc":"2.0","id":1,"method":"a"},{"jsonrpc":"2.0","method":"b"}]"#)
            .unwrap();
        match batch {
            ClassifiedMessage::Batch(items) => assert_eq!(items.len(), 2),
            other => panic!("expected Batch, got {other:?}"),
        }

        let resp_batch =
            classify(br#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","id":2,"result":{}}]"#)
                .unwrap();
        match resp_batch {
            ClassifiedMessage::ResponseBatch(items) => assert_eq!(items.len(), 2),
            other => panic!("expected ResponseBatch, got {other:?}"),
        }
    }

    #[test]
    fn classify_empty_batch_is_distinguished() {
        let err = classify(b"[]").unwrap_err();
        assert!(matches!(err, ClassifyError::EmptyBatch));
    }

    #[test]
    fn classify_mixed_batch_fails() {
        let err = classify(br#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","id":2,"method":"x"}]"#)
            .unwrap_err();
        assert!(matches!(err, ClassifyError::MixedBatch));
    }

    #[test]
    fn classify_garbage_is_parse_error() {
        let err = classify(b"not json").unwrap_err();
        assert!(matches!(err, ClassifyError::Parse(_)));
    }

    #[test]
    fn message_round_trip() {
        let msg = JsonRpcMessage::Request(JsonRpcRequest::without_params("ping", 1));
        let text = serde_json::to_string(&msg).unwrap();
        let back: JsonRpcMessage = serde_json::from_str(&text).unwrap();
        match back {
            JsonRpcMessage::Request(r) => assert_eq!(r.method, "ping"),
            _ => panic!("expected request"),
        }
    }
}

/// Re-exported union type for callers that want one enum across all wire
/// shapes rather than the two-step [`classify`] result. Not used by the
/// classifier itself (which must distinguish response-batches precisely),
/// but convenient for simple round-trip serialization call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request.
    Request(JsonRpcRequest),
    /// A response.
    Response(JsonRpcResponse),
    /// A notification.
    Notification(JsonRpcNotification),
    /// A batch of requests/notifications.
    RequestBatch(JsonRpcBatch<JsonRpcRequest>),
    /// A batch of responses.
    ResponseBatch(JsonRpcBatch<JsonRpcResponse>),
}

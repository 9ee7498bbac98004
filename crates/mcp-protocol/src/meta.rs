//! `_meta` handling (§6): the one recognized key is `progressToken`; every
//! other key under `_meta` is preserved verbatim for forward compatibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A progress token: either an integer or a string (§3), unique across all
/// in-flight requests that requested progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// Numeric token.
    Number(i64),
    /// String token.
    String(String),
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ProgressToken {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for ProgressToken {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&crate::jsonrpc::RequestId> for ProgressToken {
    fn from(id: &crate::jsonrpc::RequestId) -> Self {
        match id {
            crate::jsonrpc::RequestId::Number(n) => Self::Number(*n),
            crate::jsonrpc::RequestId::String(s) => Self::String(s.clone()),
        }
    }
}

/// A read/write view over a request's `params._meta` object.
///
/// Unknown keys round-trip untouched: [`RequestMeta::inject_progress_token`]
/// only ever adds or overwrites the `progressToken` key in the underlying
/// `params` value, leaving every other key (including ones this crate has
/// never heard of) exactly as the caller supplied it.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    meta: Option<serde_json::Map<String, Value>>,
}

impl RequestMeta {
    /// Read the `_meta` object out of a `params` value, if any.
    pub fn from_params(params: Option<&Value>) -> Self {
        let meta = params
            .and_then(|p| p.get("_meta"))
            .and_then(|m| m.as_object())
            .cloned();
        Self { meta }
    }

    /// The progress token, if `_meta.progressToken` is present and well-formed.
    pub fn progress_token(&self) -> Option<ProgressToken> {
        let raw = self.meta.as_ref()?.get("progressToken")?;
        serde_json::from_value(raw.clone()).ok()
    }

    /// Return `params` with `_meta.progressToken` set to `token`, preserving
    /// every other key already present (in `_meta` and in `params` itself).
    pub fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> Value {
        let mut params = match params {
            Some(Value::Object(map)) => map,
            Some(other) => {
                // Non-object params can't carry `_meta`; wrap defensively
                // rather than silently drop the caller's params.
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };

        let mut meta = match params.remove("_meta") {
            Some(Value::Object(existing)) => existing,
            _ => serde_json::Map::new(),
        };
        meta.insert(
            "progressToken".to_string(),
            serde_json::to_value(token).expect("ProgressToken always serializes"),
        );
        params.insert("_meta".to_string(), Value::Object(meta));
        Value::Object(params)
    }
}

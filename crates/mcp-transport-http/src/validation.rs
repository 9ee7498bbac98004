//! Validation pipeline (§4.7): a sequence of validators run in order; the
//! first one to return `Some(error)` short-circuits the request.

use crate::config::OriginPolicy;
use crate::error::HttpTransportError;
use axum::http::HeaderMap;

/// What a validator needs to know about the inbound request besides its
/// headers: whether this is an `initialize` POST (exempt from some checks)
/// and whether a session id is already known to exist.
pub struct ValidationContext<'a> {
    pub is_initialize: bool,
    pub is_get: bool,
    pub session_header: Option<&'a str>,
    pub known_session: bool,
    pub stateful: bool,
    pub supported_versions: &'a [String],
    pub origin_policy: &'a OriginPolicy,
}

/// One validation rule. Implementors inspect headers plus a
/// [`ValidationContext`] and either pass (`None`) or reject (`Some`).
pub trait Validator: Send + Sync {
    fn validate(&self, headers: &HeaderMap, ctx: &ValidationContext<'_>) -> Option<HttpTransportError>;
}

/// Run every validator in order, stopping at the first rejection.
pub fn run_pipeline(
    validators: &[Box<dyn Validator>],
    headers: &HeaderMap,
    ctx: &ValidationContext<'_>,
) -> Option<HttpTransportError> {
    validators.iter().find_map(|v| v.validate(headers, ctx))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// §4.7: POST must accept `application/json` (stateless) or both
/// `application/json` and `text/event-stream` (stateful); GET must accept
/// `text/event-stream`.
pub struct AcceptHeaderValidator;

impl Validator for AcceptHeaderValidator {
    fn validate(&self, headers: &HeaderMap, ctx: &ValidationContext<'_>) -> Option<HttpTransportError> {
        let accept = header_str(headers, "accept").unwrap_or("");
        let ok = if ctx.is_get {
            accept.contains("text/event-stream")
        } else if ctx.stateful {
            accept.contains("application/json") && accept.contains("text/event-stream")
        } else {
            accept.contains("application/json")
        };
        (!ok).then_some(HttpTransportError::NotAcceptable)
    }
}

/// §4.7: POST must carry `Content-Type: application/json`.
pub struct ContentTypeValidator;

impl Validator for ContentTypeValidator {
    fn validate(&self, headers: &HeaderMap, ctx: &ValidationContext<'_>) -> Option<HttpTransportError> {
        if ctx.is_get {
            return None;
        }
        let content_type = header_str(headers, "content-type").unwrap_or("");
        (!content_type.starts_with("application/json")).then_some(HttpTransportError::UnsupportedMediaType)
    }
}

/// §4.7: `MCP-Protocol-Version`, if present, must be in the supported set.
/// `initialize` requests are exempt (the version lives in the body).
pub struct ProtocolVersionValidator;

impl Validator for ProtocolVersionValidator {
    fn validate(&self, headers: &HeaderMap, ctx: &ValidationContext<'_>) -> Option<HttpTransportError> {
        if ctx.is_initialize {
            return None;
        }
        match header_str(headers, "mcp-protocol-version") {
            Some(version) if !ctx.supported_versions.iter().any(|v| v == version) => {
                Some(HttpTransportError::UnsupportedProtocolVersion)
            }
            _ => None,
        }
    }
}

/// §4.7: non-initialize requests on a stateful transport must carry a
/// `Mcp-Session-Id` matching a known session.
pub struct SessionValidator;

impl Validator for SessionValidator {
    fn validate(&self, _headers: &HeaderMap, ctx: &ValidationContext<'_>) -> Option<HttpTransportError> {
        if !ctx.stateful || ctx.is_initialize {
            return None;
        }
        match ctx.session_header {
            None => Some(HttpTransportError::MissingSession),
            Some(_) if !ctx.known_session => Some(HttpTransportError::UnknownSession),
            Some(_) => None,
        }
    }
}

/// §4.7: DNS-rebinding defense. Localhost mode allows `Host`/`Origin`
/// matching `localhost|127.0.0.1|[::1]` (with an optional port); custom mode
/// checks an explicit allowlist. Clients without an `Origin` header (i.e.
/// non-browser clients) are always allowed.
pub struct OriginValidator;

impl Validator for OriginValidator {
    fn validate(&self, headers: &HeaderMap, ctx: &ValidationContext<'_>) -> Option<HttpTransportError> {
        let host = header_str(headers, "host");
        if let Some(host) = host {
            if !ctx.origin_policy.allows_host(host) {
                return Some(HttpTransportError::HostDenied);
            }
        }
        match header_str(headers, "origin") {
            None => None,
            Some(origin) if ctx.origin_policy.allows_origin(origin) => None,
            Some(_) => Some(HttpTransportError::OriginDenied),
        }
    }
}

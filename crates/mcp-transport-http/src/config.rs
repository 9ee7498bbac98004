//! Streamable HTTP configuration: bind address, endpoint path, origin
//! policy, and event-store sizing.

use crate::event_store::DEFAULT_MAX_EVENTS_PER_SESSION;

/// DNS-rebinding defense policy for the `Host`/`Origin` validators (§4.7).
#[derive(Debug, Clone)]
pub enum OriginPolicy {
    /// Allow only loopback hosts/origins: `localhost`, `127.0.0.1`, `[::1]`,
    /// each with an optional port.
    Localhost,
    /// Allow only the listed origins (exact string match), and any host.
    Allowlist(Vec<String>),
}

fn is_loopback_authority(authority: &str) -> bool {
    let host = authority.split(':').next().unwrap_or(authority);
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

impl OriginPolicy {
    pub fn allows_host(&self, host: &str) -> bool {
        match self {
            Self::Localhost => is_loopback_authority(host),
            Self::Allowlist(_) => true,
        }
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        match self {
            Self::Localhost => origin
                .split("://")
                .nth(1)
                .is_some_and(is_loopback_authority),
            Self::Allowlist(allowed) => allowed.iter().any(|a| a == origin),
        }
    }
}

/// Tunables for a Streamable HTTP transport instance.
#[derive(Debug, Clone)]
pub struct StreamableHttpConfig {
    pub(crate) endpoint_path: String,
    pub(crate) supported_versions: Vec<String>,
    pub(crate) origin_policy: OriginPolicy,
    pub(crate) max_events_per_session: usize,
    pub(crate) sse_retry_ms: Option<u64>,
    /// `true` for the session+SSE variant, `false` for the stateless
    /// request/response variant (§4.7: GET and DELETE are `405` there, and
    /// no `Mcp-Session-Id` is ever issued or required).
    pub(crate) stateful: bool,
}

impl Default for StreamableHttpConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/mcp".to_string(),
            supported_versions: vec!["2025-06-18".to_string()],
            origin_policy: OriginPolicy::Localhost,
            max_events_per_session: DEFAULT_MAX_EVENTS_PER_SESSION,
            sse_retry_ms: Some(2000),
            stateful: true,
        }
    }
}

impl StreamableHttpConfig {
    pub fn builder() -> StreamableHttpConfigBuilder {
        StreamableHttpConfigBuilder::default()
    }

    pub fn endpoint_path(&self) -> &str {
        &self.endpoint_path
    }

    pub fn supported_versions(&self) -> &[String] {
        &self.supported_versions
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    pub fn sse_retry_ms(&self) -> Option<u64> {
        self.sse_retry_ms
    }
}

#[derive(Debug, Default)]
pub struct StreamableHttpConfigBuilder {
    config: StreamableHttpConfig,
}

impl StreamableHttpConfigBuilder {
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint_path = path.into();
        self
    }

    pub fn supported_versions(mut self, versions: Vec<String>) -> Self {
        self.config.supported_versions = versions;
        self
    }

    pub fn origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.config.origin_policy = policy;
        self
    }

    pub fn max_events_per_session(mut self, max: usize) -> Self {
        self.config.max_events_per_session = max;
        self
    }

    pub fn stateless(mut self) -> Self {
        self.config.stateful = false;
        self
    }

    pub fn build(self) -> StreamableHttpConfig {
        self.config
    }
}

//! Peer configuration: strict mode, default request timeout.

use std::time::Duration;

/// Tunables for a [`Peer`](crate::peer::Peer).
///
/// Built with [`PeerConfig::builder`], matching the `Config`/builder
/// convention used throughout the workspace (`mcp-transport-http` does the
/// same for its HTTP-facing settings).
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub(crate) strict: bool,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) reset_on_progress: bool,
    pub(crate) max_total_timeout: Option<Duration>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            strict: true,
            default_timeout: None,
            reset_on_progress: true,
            max_total_timeout: None,
        }
    }
}

impl PeerConfig {
    pub fn builder() -> PeerConfigBuilder {
        PeerConfigBuilder::default()
    }
}

/// Builder for [`PeerConfig`].
#[derive(Debug, Default)]
pub struct PeerConfigBuilder {
    config: PeerConfig,
}

impl PeerConfigBuilder {
    /// Enable or disable strict-mode gating (§4.4). Defaults to `true`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    /// Default per-request timeout applied when a caller doesn't supply one.
    /// `None` (the default) means requests never time out unless the caller
    /// opts in explicitly.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    /// Whether the default timeout resets its deadline on each progress
    /// notification. Defaults to `true`.
    pub fn reset_on_progress(mut self, reset: bool) -> Self {
        self.config.reset_on_progress = reset;
        self
    }

    /// An absolute cap on cumulative wait time regardless of progress.
    pub fn max_total_timeout(mut self, timeout: Duration) -> Self {
        self.config.max_total_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> PeerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_strict_with_no_timeout() {
        let config = PeerConfig::default();
        assert!(config.strict);
        assert!(config.default_timeout.is_none());
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = PeerConfig::builder()
            .strict(false)
            .default_timeout(Duration::from_secs(30))
            .max_total_timeout(Duration::from_secs(120))
            .build();

        assert!(!config.strict);
        assert_eq!(config.default_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_total_timeout, Some(Duration::from_secs(120)));
    }
}

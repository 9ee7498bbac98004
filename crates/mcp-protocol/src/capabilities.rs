//! Capability bags exchanged during the `initialize` handshake (§3).
//!
//! A capability declared as present enables the corresponding method
//! family; absent means unsupported. Strict mode (§4.4) gates method
//! invocations against these bags before a message ever hits the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Client-side capability bag.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
    /// Present if the client can list filesystem roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    /// Present if the client can serve LLM sampling requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    /// Present if the client can serve elicitation requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
}

/// Server-side capability bag.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
    /// Present if the server can push log messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    /// Present if the server offers argument completion suggestions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionCapability>,
    /// Present if the server offers prompt templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListCapability>,
    /// Present if the server offers resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Present if the server offers tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapability>,
}

/// Roots capability (client).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RootsCapability {
    /// Whether the root list can change after initialization.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Sampling capability (client); no sub-options today.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SamplingCapability;

/// Elicitation capability (client); no sub-options today.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ElicitationCapability;

/// Logging capability (server); no sub-options today.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingCapability;

/// Completion capability (server); no sub-options today.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionCapability;

/// A capability bag that can report a changing list (prompts, tools).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListCapability {
    /// Whether the list can change after initialization.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resources capability (server).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourcesCapability {
    /// Whether resource subscriptions are supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether the resource list can change after initialization.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// A named capability family, used by strict-mode gating to look a method's
/// required capability up in a peer's advertised bag without hand-matching
/// on method-name prefixes at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityName {
    /// Client: roots listing.
    Roots,
    /// Client: sampling.
    Sampling,
    /// Client: elicitation.
    Elicitation,
    /// Server: logging.
    Logging,
    /// Server: completions.
    Completions,
    /// Server: prompts.
    Prompts,
    /// Server: resources.
    Resources,
    /// Server: tools.
    Tools,
}

impl ClientCapabilities {
    /// Whether the client declares the named capability.
    pub fn declares(&self, name: CapabilityName) -> bool {
        match name {
            CapabilityName::Roots => self.roots.is_some(),
            CapabilityName::Sampling => self.sampling.is_some(),
            CapabilityName::Elicitation => self.elicitation.is_some(),
            _ => false,
        }
    }
}

impl ServerCapabilities {
    /// Whether the server declares the named capability.
    pub fn declares(&self, name: CapabilityName) -> bool {
        match name {
            CapabilityName::Logging => self.logging.is_some(),
            CapabilityName::Completions => self.completions.is_some(),
            CapabilityName::Prompts => self.prompts.is_some(),
            CapabilityName::Resources => self.resources.is_some(),
            CapabilityName::Tools => self.tools.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_reflects_presence() {
        let caps = ServerCapabilities {
            tools: Some(ListCapability { list_changed: Some(true) }),
            ..Default::default()
        };
        assert!(caps.declares(CapabilityName::Tools));
        assert!(!caps.declares(CapabilityName::Prompts));
    }

    #[test]
    fn default_capabilities_declare_nothing() {
        let caps = ClientCapabilities::default();
        assert!(!caps.declares(CapabilityName::Sampling));
        assert!(!caps.declares(CapabilityName::Roots));
        assert!(!caps.declares(CapabilityName::Elicitation));
    }

    #[test]
    fn serializes_without_absent_fields() {
        let caps = ServerCapabilities::default();
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}

//! Initialize handshake types and pure version negotiation (§4.4).
//!
//! Version comparison is exact-set-membership only (Open Question §9,
//! resolved in SPEC_FULL.md): no lexical date ordering, no `DRAFT` special
//! casing. The server's supported set is an ordered list; on a mismatch it
//! falls back to its last (newest-configured) entry.

use crate::capabilities::{ClientCapabilities, ServerCapabilities};
use serde::{Deserialize, Serialize};

/// Identification of a client or server implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Implementation name.
    pub name: String,
    /// Implementation version string.
    pub version: String,
}

/// Identification of a server implementation (same shape as [`ClientInfo`],
/// kept distinct so callers never confuse which side a value describes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Implementation name.
    pub name: String,
    /// Implementation version string.
    pub version: String,
}

/// Parameters of an `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    /// The protocol version the client proposes.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// The client's capability bag.
    pub capabilities: ClientCapabilities,
    /// Client identification.
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

/// Result of an `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// The protocol version the server chose (§4.4's negotiation outcome).
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// The server's capability bag.
    pub capabilities: ServerCapabilities,
    /// Server identification.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Optional free-text instructions for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Negotiate a protocol version per §4.4: if the client's proposal is in the
/// server's supported set, echo it back; otherwise fall back to the server's
/// latest (last-configured) supported version.
///
/// Idempotent by construction (§8): calling this twice with the same inputs
/// returns the same result, and `negotiate_version(negotiate_version(v, s), s)
/// == negotiate_version(v, s)` whenever the server's supported set contains
/// at least the chosen version.
pub fn negotiate_version(proposed: &str, supported: &[String]) -> String {
    if supported.iter().any(|v| v == proposed) {
        proposed.to_string()
    } else {
        supported
            .last()
            .cloned()
            .unwrap_or_else(|| proposed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(vs: &[&str]) -> Vec<String> {
        vs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn proposal_in_supported_set_is_echoed() {
        let supported = versions(&["2025-06-18", "2025-11-25"]);
        assert_eq!(negotiate_version("2025-06-18", &supported), "2025-06-18");
    }

    #[test]
    fn proposal_not_supported_falls_back_to_latest_configured() {
        let supported = versions(&["2025-06-18", "2025-11-25"]);
        assert_eq!(negotiate_version("2024-01-01", &supported), "2025-11-25");
    }

    #[test]
    fn negotiation_is_idempotent() {
        let supported = versions(&["2025-06-18", "2025-11-25"]);
        let first = negotiate_version("2025-06-18", &supported);
        let second = negotiate_version(&first, &supported);
        assert_eq!(first, second);

        let first_unsupported = negotiate_version("DRAFT", &supported);
        let second_unsupported = negotiate_version(&first_unsupported, &supported);
        assert_eq!(first_unsupported, second_unsupported);
    }

    #[test]
    fn empty_supported_set_echoes_proposal() {
        assert_eq!(negotiate_version("2025-06-18", &[]), "2025-06-18");
    }

    #[test]
    fn initialize_result_round_trips() {
        let result = InitializeResult {
            protocol_version: "2025-06-18".into(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: "s".into(),
                version: "1".into(),
            },
            instructions: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("instructions"));
        let back: InitializeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.protocol_version, "2025-06-18");
    }
}

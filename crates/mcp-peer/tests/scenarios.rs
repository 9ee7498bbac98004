//! End-to-end scenarios that exercise a client/server pair across a real
//! `DuplexTransport`, as opposed to `peer.rs`'s own inline unit tests which
//! focus on one mechanism at a time.

use mcp_peer::{Client, DuplexTransport, Peer, PeerConfig, Server};
use mcp_protocol::capabilities::ListCapability;
use mcp_protocol::{
    CapabilityName, ClientCapabilities, ClientInfo, RequestMeta, ServerCapabilities, ServerInfo,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn connect_pair(server_capabilities: ServerCapabilities) -> (Peer<Client>, Peer<Server>) {
    let (client_transport, server_transport) = DuplexTransport::pair(32);
    let client = Peer::<Client>::connect(client_transport, PeerConfig::default());
    let server = Peer::<Server>::connect(
        server_transport,
        PeerConfig::default(),
        ServerInfo { name: "scenario-server".into(), version: "1".into() },
        server_capabilities,
        vec!["2025-06-18".into()],
        None,
    );
    (client, server)
}

async fn initialize(client: &Peer<Client>) {
    client
        .initialize(
            ClientInfo { name: "scenario-client".into(), version: "1".into() },
            ClientCapabilities::default(),
            "2025-06-18",
        )
        .await
        .unwrap();
    // The server's `notifications/initialized` handling runs on its own
    // receive loop; give it a tick before relying on its lifecycle state.
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn progress_notifications_reach_the_caller_before_the_final_result() {
    let (client, server) = connect_pair(ServerCapabilities {
        tools: Some(ListCapability::default()),
        ..Default::default()
    });
    let server = Arc::new(server);
    initialize(&client).await;

    server
        .on_request("tools/call", {
            let server = server.clone();
            Arc::new(move |params: Option<Value>| {
                let server = server.clone();
                async move {
                    let token = RequestMeta::from_params(params.as_ref()).progress_token();
                    if let Some(token) = token {
                        for step in [0.25, 0.5, 0.75] {
                            server
                                .notify(
                                    "notifications/progress",
                                    Some(json!({"progressToken": token, "progress": step})),
                                )
                                .await
                                .unwrap();
                        }
                    }
                    Ok(json!({"content": [{"type": "text", "text": "done"}]}))
                }
            })
        })
        .await;

    let seen = Arc::new(AtomicU32::new(0));
    let seen_clone = seen.clone();
    let context = client
        .send_with_progress(
            "tools/call",
            Some(json!({"name": "slow-tool"})),
            Arc::new(move |progress: f64, _total: Option<f64>, _message: Option<String>| {
                let seen_clone = seen_clone.clone();
                async move {
                    assert!(progress > 0.0);
                    seen_clone.fetch_add(1, Ordering::SeqCst);
                }
            }),
            None,
        )
        .await
        .unwrap();

    let response = context.result().await.unwrap();
    assert!(!response.is_error());
    assert_eq!(seen.load(Ordering::SeqCst), 3, "all three progress steps should have been delivered");
}

#[tokio::test]
async fn strict_mode_rejects_a_call_the_server_never_declared() {
    let (client, server) = connect_pair(ServerCapabilities::default());
    initialize(&client).await;
    let _ = &server;

    let err = client
        .require_remote_capability(CapabilityName::Tools)
        .await
        .unwrap_err();
    assert_eq!(err.kind, mcp_protocol::McpErrorKind::MethodNotFound);
}

#[tokio::test]
async fn strict_mode_allows_a_call_the_server_declared() {
    let (client, server) = connect_pair(ServerCapabilities {
        tools: Some(ListCapability::default()),
        ..Default::default()
    });
    initialize(&client).await;
    let _ = &server;

    assert!(client.require_remote_capability(CapabilityName::Tools).await.is_ok());
}

#[tokio::test]
async fn permissive_config_skips_the_capability_gate_entirely() {
    let (client_transport, server_transport) = DuplexTransport::pair(32);
    let permissive = PeerConfig::builder().strict(false).build();
    let client = Peer::<Client>::connect(client_transport, permissive);
    let server = Peer::<Server>::connect(
        server_transport,
        PeerConfig::default(),
        ServerInfo { name: "scenario-server".into(), version: "1".into() },
        ServerCapabilities::default(),
        vec!["2025-06-18".into()],
        None,
    );
    initialize(&client).await;
    let _ = &server;

    assert!(client.require_remote_capability(CapabilityName::Tools).await.is_ok());
}

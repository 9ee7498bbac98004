//! Minimal client/server round trip over an in-memory duplex transport: no
//! sockets, just the peer engine talking to itself across two ends of a
//! channel pair. Useful as a smoke test for a fresh checkout and as a
//! reference for wiring up `Peer` against any other `Transport`.
//!
//! ```bash
//! cargo run --bin duplex-roundtrip
//! ```

use mcp_peer::{Client, DuplexTransport, Peer, PeerConfig, Server};
use mcp_protocol::{ClientCapabilities, ClientInfo, ServerCapabilities, ServerInfo};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let (client_transport, server_transport) = DuplexTransport::pair(32);

    let server = Peer::<Server>::connect(
        server_transport,
        PeerConfig::default(),
        ServerInfo { name: "demo-server".into(), version: "0.1.0".into() },
        ServerCapabilities::default(),
        vec!["2025-06-18".into()],
        None,
    );
    server
        .on_request("echo", Arc::new(|params: Option<serde_json::Value>| async move { Ok(params.unwrap_or_default()) }))
        .await;

    let client = Peer::<Client>::connect(client_transport, PeerConfig::default());
    let init = client
        .initialize(ClientInfo { name: "demo-client".into(), version: "0.1.0".into() }, ClientCapabilities::default(), "2025-06-18")
        .await?;
    tracing::info!(server = %init.server_info.name, protocol_version = %init.protocol_version, "initialized");

    let context = client.send("echo", Some(json!({"message": "hello from the demo client"}))).await?;
    let response = context.result().await?;
    println!("{}", serde_json::to_string_pretty(&response.result())?);

    client.disconnect().await;
    server.disconnect().await;
    Ok(())
}

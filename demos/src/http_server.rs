//! Stateful Streamable HTTP server exposing one tool, `echo`, over
//! `http://127.0.0.1:8080/mcp`.
//!
//! ```bash
//! cargo run --bin http-server
//!
//! curl -i -X POST http://127.0.0.1:8080/mcp \
//!   -H 'content-type: application/json' \
//!   -H 'accept: application/json, text/event-stream' \
//!   -d '{"jsonrpc":"2.0","method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"curl","version":"0"}},"id":1}'
//! ```

use mcp_peer::{Peer, PeerConfig, Server};
use mcp_protocol::{ServerCapabilities, ServerInfo};
use mcp_transport_http::{PeerConfigurer, StreamableHttpConfig, StreamableHttpService};
use std::sync::Arc;

fn configure_echo() -> PeerConfigurer {
    Arc::new(|peer: &Peer<Server>| {
        Box::pin(async move {
            peer.on_request("echo", Arc::new(|params: Option<serde_json::Value>| async move {
                Ok(params.unwrap_or_default())
            }))
            .await;
        })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = StreamableHttpConfig::builder().build();
    let service = StreamableHttpService::new(
        config,
        PeerConfig::default(),
        ServerInfo { name: "demo-http-server".into(), version: "0.1.0".into() },
        ServerCapabilities::default(),
        None,
        configure_echo(),
    )
    .await;

    let bind_addr = "127.0.0.1:8080";
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(server = "demo-http-server", %bind_addr, endpoint = "/mcp", "listening");

    axum::serve(listener, service.router()).await?;
    Ok(())
}

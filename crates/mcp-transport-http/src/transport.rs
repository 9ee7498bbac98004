//! [`mcp_peer::Transport`] implementation that hands inbound bytes to the
//! peer engine from whichever HTTP request delivered them, and routes
//! outbound bytes back out through the [`StreamRegistry`] (§4.7).
//!
//! One instance is owned by exactly one `Peer<Server>`'s internal actor
//! loop (mirroring [`mcp_peer::transport::DuplexTransport`]); the HTTP
//! handlers never touch it directly; they go through the cloneable
//! [`HttpServerTransportHandle`] instead.

use crate::registry::StreamRegistry;
use crate::session::SessionId;
use async_trait::async_trait;
use bytes::Bytes;
use mcp_protocol::McpError;
use tokio::sync::mpsc;

/// The half the `Peer<Server>` actor loop drives: `send` routes through the
/// registry, `recv` drains whatever the HTTP layer fed in.
pub struct HttpServerTransport {
    session: SessionId,
    registry: StreamRegistry,
    inbound_rx: mpsc::UnboundedReceiver<Bytes>,
}

/// The half the HTTP handlers hold: feed inbound request/notification/
/// response bytes in, one per POST body.
#[derive(Clone)]
pub struct HttpServerTransportHandle {
    inbound_tx: mpsc::UnboundedSender<Bytes>,
}

impl HttpServerTransportHandle {
    /// Deliver one HTTP request body's bytes to the engine. Fails only if
    /// the engine's actor loop has already shut down.
    pub fn deliver(&self, bytes: Bytes) -> Result<(), McpError> {
        self.inbound_tx
            .send(bytes)
            .map_err(|_| McpError::connection_closed("session engine has stopped"))
    }
}

/// Build a connected transport/handle pair for one session.
pub fn session_transport(
    session: SessionId,
    registry: StreamRegistry,
) -> (HttpServerTransport, HttpServerTransportHandle) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        HttpServerTransport {
            session,
            registry,
            inbound_rx,
        },
        HttpServerTransportHandle { inbound_tx },
    )
}

#[async_trait]
impl mcp_peer::Transport for HttpServerTransport {
    async fn send(&self, bytes: Bytes) -> Result<(), McpError> {
        self.registry.route_outbound(&self.session, bytes).await;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, McpError> {
        Ok(self.inbound_rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::EventStore;
    use mcp_peer::Transport;

    #[tokio::test]
    async fn delivered_bytes_surface_through_recv() {
        let registry = StreamRegistry::new(EventStore::default());
        let session = SessionId::new();
        let (mut transport, handle) = session_transport(session, registry);

        handle.deliver(Bytes::from_static(b"{}")).unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn dropping_the_handle_closes_recv() {
        let registry = StreamRegistry::new(EventStore::default());
        let session = SessionId::new();
        let (mut transport, handle) = session_transport(session, registry);
        drop(handle);
        assert_eq!(transport.recv().await.unwrap(), None);
    }
}

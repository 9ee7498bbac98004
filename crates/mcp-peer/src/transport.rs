//! The transport seam (§1: "concrete transports … are out of scope").
//!
//! [`Transport`] is the only interface the peer engine needs from whatever
//! carries bytes between processes. Concrete transports (stdio, Unix socket,
//! Streamable HTTP, WebSocket) are external collaborators that implement it;
//! this crate ships one in-memory implementation, [`DuplexTransport`], used
//! by its own tests and by `mcp-transport-http`'s in-process wiring tests.

use async_trait::async_trait;
use bytes::Bytes;
use mcp_protocol::McpError;
use tokio::sync::mpsc;

/// A bidirectional, message-framed byte transport.
///
/// Each call to [`Transport::recv`] returns one already-framed JSON-RPC
/// payload (or `None` when the transport has closed). Framing below this
/// line — newline-delimited stdio, HTTP chunking, WebSocket message
/// boundaries — is the concrete transport's job, not the engine's.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one framed payload.
    async fn send(&self, bytes: Bytes) -> Result<(), McpError>;

    /// Receive the next framed payload, or `None` if the transport closed.
    async fn recv(&mut self) -> Result<Option<Bytes>, McpError>;
}

/// An in-memory duplex pair: writing to one end is readable from the other.
///
/// Grounded on the teacher's pattern of pairing an outbound `mpsc::Sender`
/// with an inbound `mpsc::Receiver` per transport instance (see
/// `turbomcp-transport-streamable`'s per-stream channels); here both
/// directions are plain byte channels so two `DuplexTransport`s can stand in
/// for a full client/server connection in tests without any I/O.
pub struct DuplexTransport {
    outbound: mpsc::Sender<Bytes>,
    inbound: mpsc::Receiver<Bytes>,
}

impl DuplexTransport {
    /// Create a connected pair: `(a, b)` where everything `a` sends, `b`
    /// receives, and vice versa.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(capacity);
        let (tx_b, rx_b) = mpsc::channel(capacity);
        (
            Self {
                outbound: tx_a,
                inbound: rx_b,
            },
            Self {
                outbound: tx_b,
                inbound: rx_a,
            },
        )
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn send(&self, bytes: Bytes) -> Result<(), McpError> {
        self.outbound
            .send(bytes)
            .await
            .map_err(|_| McpError::connection_closed("duplex transport peer dropped"))
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, McpError> {
        Ok(self.inbound.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplex_pair_delivers_both_directions() {
        let (mut a, mut b) = DuplexTransport::pair(8);

        a.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(b.recv().await.unwrap().unwrap(), Bytes::from_static(b"ping"));

        b.send(Bytes::from_static(b"pong")).await.unwrap();
        assert_eq!(a.recv().await.unwrap().unwrap(), Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn dropping_one_end_closes_the_other() {
        let (a, mut b) = DuplexTransport::pair(8);
        drop(a);
        assert_eq!(b.recv().await.unwrap(), None);
    }
}

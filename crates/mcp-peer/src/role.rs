//! Role marker types (§4.4 REDESIGN FLAG): a single [`Peer<R>`] engine is
//! generic over which side of the connection it plays, instead of
//! duplicating near-identical client and server implementations.

use mcp_protocol::{ClientCapabilities, ServerCapabilities};

/// Which side of an MCP connection a [`Peer`](crate::peer::Peer) plays.
///
/// The two sides differ only in which capability set they declare locally
/// and which they expect from the other end — the request/response/
/// notification machinery is identical either way.
pub trait Role: Send + Sync + 'static {
    /// The capability type this side declares about itself.
    type LocalCapabilities: Clone + Send + Sync + Default + 'static;
    /// The capability type this side expects to receive from its peer.
    type RemoteCapabilities: Clone + Send + Sync + Default + 'static;

    /// Short name used in log fields (`"client"` / `"server"`).
    fn name() -> &'static str;
}

/// The client side: declares [`ClientCapabilities`], expects
/// [`ServerCapabilities`] back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Client;

impl Role for Client {
    type LocalCapabilities = ClientCapabilities;
    type RemoteCapabilities = ServerCapabilities;

    fn name() -> &'static str {
        "client"
    }
}

/// The server side: declares [`ServerCapabilities`], expects
/// [`ClientCapabilities`] back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Server;

impl Role for Server {
    type LocalCapabilities = ServerCapabilities;
    type RemoteCapabilities = ClientCapabilities;

    fn name() -> &'static str {
        "server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_report_distinct_names() {
        assert_eq!(Client::name(), "client");
        assert_eq!(Server::name(), "server");
    }
}

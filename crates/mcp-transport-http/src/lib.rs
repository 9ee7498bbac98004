//! Streamable HTTP transport (§4.7): the stateful session+SSE variant and
//! the stateless request/response variant, both served from one axum
//! [`Router`](axum::Router) built by [`StreamableHttpService`].
//!
//! This crate only builds the HTTP surface; the protocol engine underneath
//! is [`mcp_peer::Peer`]. Callers supply a [`service::PeerConfigurer`] that
//! registers request/notification handlers on each session's peer exactly
//! as they would for any other transport.

pub mod config;
pub mod error;
pub mod event_store;
pub mod registry;
pub mod service;
pub mod session;
pub mod sse;
pub mod transport;
pub mod validation;

pub use config::{OriginPolicy, StreamableHttpConfig, StreamableHttpConfigBuilder};
pub use error::HttpTransportError;
pub use event_store::{EventStore, StoredEvent};
pub use registry::{RoutedMessage, StreamRegistry};
pub use service::{PeerConfigurer, ServiceStats, StreamableHttpService};
pub use session::{Session, SessionId, SessionState, SessionStore, StandaloneAlreadyOpen};
pub use sse::SseEvent;
pub use transport::{session_transport, HttpServerTransport, HttpServerTransportHandle};

//! Bidirectional JSON-RPC peer engine.
//!
//! [`Peer<R>`] is symmetric over [`Client`] and [`Server`]: it owns the
//! pending-request table, handler registry, lifecycle state, and progress
//! coordinator that both sides of an MCP connection need, and differs only
//! in which `initialize` role it plays (§4.4).

pub mod config;
pub mod lifecycle_state;
pub mod peer;
pub mod pending;
pub mod progress;
pub mod registry;
pub mod role;
pub mod transport;

pub use config::{PeerConfig, PeerConfigBuilder};
pub use lifecycle_state::{require_capability, LifecycleCell, LifecycleState};
pub use peer::{Peer, RequestContext};
pub use pending::{AwaitOutcome, PendingRequestTable};
pub use progress::{ProgressCallback, ProgressCoordinator, TimeoutController};
pub use registry::{HandlerRegistry, NotificationHandler, RequestHandler};
pub use role::{Client, Role, Server};
pub use transport::{DuplexTransport, Transport};

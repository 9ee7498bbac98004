//! Connection lifecycle state machine (§4.4):
//! `Uninitialized -> Initializing -> Initialized -> Disconnected`.

use mcp_protocol::{CapabilityName, McpError};
use std::sync::atomic::{AtomicU8, Ordering};

/// The lifecycle phase of a peer connection.
///
/// Transitions are one-directional: `Uninitialized -> Initializing ->
/// Initialized -> Disconnected`. There is no way back to an earlier state;
/// a fresh connection needs a fresh [`Peer`](crate::peer::Peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// No `initialize` exchange has happened yet.
    Uninitialized = 0,
    /// `initialize` has been sent or received but not yet completed.
    Initializing = 1,
    /// `initialize` completed; the connection is open for business.
    Initialized = 2,
    /// The transport closed or the peer was explicitly disconnected.
    Disconnected = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Initialized,
            _ => Self::Disconnected,
        }
    }
}

/// Atomic holder for a [`LifecycleState`], shared between the peer engine's
/// public handle and its receive loop.
#[derive(Debug, Default)]
pub struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Uninitialized as u8))
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Snapshot the current phase. Same as [`Self::get`]; kept as a named
    /// alias for call sites asking "where are we right now" rather than
    /// reading a plain getter, e.g. the `initialize` re-entry guard.
    pub fn current(&self) -> LifecycleState {
        self.get()
    }

    /// Move to `next` unconditionally. Callers are expected to only ever
    /// move forward (see [`LifecycleState`]'s docs); this type does not
    /// itself forbid going backward, since the one place that calls it
    /// (the peer engine) already only ever advances.
    pub fn set(&self, next: LifecycleState) {
        self.0.store(next as u8, Ordering::SeqCst);
    }

    /// Require that the connection has finished `initialize` before
    /// proceeding. Used to gate every request/notification other than
    /// `initialize` itself (§4.4, "strict mode").
    pub fn require_initialized(&self) -> Result<(), McpError> {
        match self.get() {
            LifecycleState::Initialized => Ok(()),
            other => Err(McpError::invalid_request(format!(
                "connection is not initialized (state: {other:?})"
            ))),
        }
    }

    pub fn require_not_disconnected(&self) -> Result<(), McpError> {
        if self.get() == LifecycleState::Disconnected {
            Err(McpError::connection_closed("peer has disconnected"))
        } else {
            Ok(())
        }
    }
}

/// Strict-mode capability gate: reject a method call for a capability the
/// remote peer never declared, rather than letting it reach a handler that
/// assumes the capability exists (§4.4).
pub fn require_capability(declared: bool, capability: CapabilityName) -> Result<(), McpError> {
    if declared {
        Ok(())
    } else {
        Err(McpError::method_not_found(format!(
            "remote peer did not declare the {capability:?} capability"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized_and_advances_forward() {
        let cell = LifecycleCell::new();
        assert_eq!(cell.get(), LifecycleState::Uninitialized);

        cell.set(LifecycleState::Initializing);
        assert!(cell.require_initialized().is_err());

        cell.set(LifecycleState::Initialized);
        assert!(cell.require_initialized().is_ok());

        cell.set(LifecycleState::Disconnected);
        assert!(cell.require_not_disconnected().is_err());
        assert!(cell.require_initialized().is_err());
    }

    #[test]
    fn capability_gate_rejects_undeclared_capability() {
        assert!(require_capability(false, CapabilityName::Sampling).is_err());
        assert!(require_capability(true, CapabilityName::Sampling).is_ok());
    }
}

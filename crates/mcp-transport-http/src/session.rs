//! Session identity and the stateful session state machine (§4.7):
//! `Uninit -> Initialized -> (StandaloneOpen) -> Terminated`.

use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Maximum accepted length for a client-supplied `Mcp-Session-Id` header,
/// mirroring the teacher's own session-id length guard.
pub const MAX_SESSION_ID_LEN: usize = 256;

/// Opaque, visible-ASCII session identifier (0x21-0x7E), generated from
/// `rand`-backed bytes formatted as hex.
///
/// Grounded on the teacher's `turbomcp-transport-streamable::session::SessionId`,
/// which uses `getrandom` for the same purpose; this crate uses `rand`
/// instead (see DESIGN.md) since it is the workspace's general-purpose RNG
/// and `getrandom` brings nothing extra for this non-`no_std` target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session id, formatted as `mcp-{32 hex chars}`.
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("mcp-{hex}"))
    }

    /// Wrap a client- or store-supplied string, rejecting anything absurdly
    /// long (a cheap guard against header-based memory abuse).
    pub fn try_from_str(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > MAX_SESSION_ID_LEN || !s.is_ascii() {
            None
        } else {
            Some(Self(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a stateful session (§4.7's state-machine diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    StandaloneOpen,
    Terminated,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One stateful session: identity, lifecycle state, and whether a standalone
/// GET stream is currently attached (at most one per session, §4.7).
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    pub protocol_version: Option<String>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub standalone_attached: bool,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = now_millis();
        Self {
            id,
            state: SessionState::Initialized,
            protocol_version: None,
            created_at_ms: now,
            last_activity_ms: now,
            standalone_attached: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_ms = now_millis();
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }
}

/// In-memory session table, one per transport instance (§5: "single
/// session-map-per-process", Open Question resolved in SPEC_FULL.md —
/// multi-session multiplexing across processes is out of scope).
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and insert a new session, returning its id.
    pub async fn create(&self) -> SessionId {
        let session = Session::new(SessionId::new());
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        id
    }

    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn exists(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Attempt to attach the standalone GET stream. Fails if one is already
    /// attached (§4.7: "a second GET returns 409 Conflict").
    pub async fn attach_standalone(&self, id: &SessionId) -> Result<(), StandaloneAlreadyOpen> {
        let mut guard = self.sessions.write().await;
        let session = guard.get_mut(id).ok_or(StandaloneAlreadyOpen::NoSuchSession)?;
        if session.standalone_attached {
            return Err(StandaloneAlreadyOpen::Conflict);
        }
        session.standalone_attached = true;
        session.state = SessionState::StandaloneOpen;
        Ok(())
    }

    pub async fn detach_standalone(&self, id: &SessionId) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.standalone_attached = false;
        }
    }

    /// Terminate a session: idempotent, as required by §4.7.
    pub async fn terminate(&self, id: &SessionId) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.state = SessionState::Terminated;
        }
    }

    pub async fn touch(&self, id: &SessionId) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.touch();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandaloneAlreadyOpen {
    NoSuchSession,
    Conflict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_visible_ascii_and_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().is_ascii());
        assert!(a.as_str().chars().all(|c| (0x21..=0x7e).contains(&(c as u32))));
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = SessionStore::new();
        let id = store.create().await;
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.state, SessionState::Initialized);
    }

    #[tokio::test]
    async fn second_standalone_attach_conflicts() {
        let store = SessionStore::new();
        let id = store.create().await;
        store.attach_standalone(&id).await.unwrap();
        let second = store.attach_standalone(&id).await;
        assert_eq!(second, Err(StandaloneAlreadyOpen::Conflict));
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let store = SessionStore::new();
        let id = store.create().await;
        store.terminate(&id).await;
        store.terminate(&id).await;
        assert!(store.get(&id).await.unwrap().is_terminated());
    }
}
